use crate::error::{Error, Result};

/// Size of an encoded rectangle record: four little-endian `i32`.
pub const RECT_RECORD_SIZE: usize = 16;

/// Axis-aligned rectangle in pixel space.
///
/// Used both for atlas placements and for standalone metadata such as
/// collision boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge, saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge, saturating at `i32::MAX`.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// `None` if the right edge does not fit in an `i32`.
    pub fn checked_right(&self) -> Option<i32> {
        self.x.checked_add(self.width)
    }

    /// `None` if the bottom edge does not fit in an `i32`.
    pub fn checked_bottom(&self) -> Option<i32> {
        self.y.checked_add(self.height)
    }

    fn wide_edges(&self) -> (i64, i64, i64, i64) {
        let (x, y) = (self.x as i64, self.y as i64);
        (x, y, x + self.width as i64, y + self.height as i64)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn move_by(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    pub fn overlaps(&self, other: &Rectangle) -> bool {
        let (l, t, r, b) = self.wide_edges();
        let (ol, ot, or, ob) = other.wide_edges();
        l < or && ol < r && t < ob && ot < b
    }

    /// True if `other` lies completely inside `self`.
    pub fn contains(&self, other: &Rectangle) -> bool {
        let (l, t, r, b) = self.wide_edges();
        let (ol, ot, or, ob) = other.wide_edges();
        ol >= l && ot >= t && or <= r && ob <= b
    }

    pub fn to_le_bytes(&self) -> [u8; RECT_RECORD_SIZE] {
        let fields = [self.x, self.y, self.width, self.height].map(i32::to_le);
        let mut bytes = [0u8; RECT_RECORD_SIZE];
        bytes.copy_from_slice(bytemuck::bytes_of(&fields));
        bytes
    }

    /// Decodes a rectangle record. `id` only names the resource in errors.
    pub fn from_le_bytes(id: &str, data: &[u8]) -> Result<Self> {
        if data.len() != RECT_RECORD_SIZE {
            return Err(Error::decode(
                id,
                format!(
                    "rectangle record must be {} bytes, got {}",
                    RECT_RECORD_SIZE,
                    data.len()
                ),
            ));
        }

        let fields: [i32; 4] = bytemuck::pod_read_unaligned(data);
        let [x, y, width, height] = fields.map(i32::from_le);
        Ok(Self::new(x, y, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_is_little_endian() {
        let bytes = Rectangle::new(10, 20, 30, 40).to_le_bytes();
        assert_eq!(
            bytes,
            [10, 0, 0, 0, 20, 0, 0, 0, 30, 0, 0, 0, 40, 0, 0, 0]
        );
    }

    #[test]
    fn negative_coordinates_survive_decoding() {
        let rect = Rectangle::new(-5, -1, 3, 7);
        let decoded = Rectangle::from_le_bytes("r", &rect.to_le_bytes()).unwrap();
        assert_eq!(decoded, rect);
    }

    #[test]
    fn wrong_length_is_a_decode_error() {
        let err = Rectangle::from_le_bytes("short", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Decode { ref id, .. } if id == "short"));
    }

    #[test]
    fn overlap_excludes_touching_edges() {
        let a = Rectangle::new(0, 0, 10, 10);
        assert!(!a.overlaps(&Rectangle::new(10, 0, 10, 10)));
        assert!(a.overlaps(&Rectangle::new(9, 9, 10, 10)));
        assert!(a.contains(&Rectangle::new(2, 2, 8, 8)));
        assert!(!a.contains(&Rectangle::new(2, 2, 9, 8)));
    }

    #[test]
    fn edges_near_i32_max_do_not_wrap() {
        let far = Rectangle::new(i32::MAX, 0, 10, 10);
        assert_eq!(far.checked_right(), None);
        assert_eq!(far.checked_bottom(), Some(10));
        assert_eq!(far.right(), i32::MAX);

        let atlas = Rectangle::new(0, 0, 16, 16);
        assert!(!atlas.contains(&far));
        assert!(!atlas.overlaps(&far));
        assert!(!atlas.contains(&Rectangle::new(0, i32::MAX - 1, 4, 4)));
        assert!(!atlas.contains(&Rectangle::new(4, 4, i32::MAX, i32::MAX)));

        let huge = Rectangle::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert!(huge.overlaps(&Rectangle::new(-10, -10, 4, 4)));
        assert!(!huge.overlaps(&atlas));
    }
}
