//! Offline texture atlas packing.
//!
//! Many small sprites are placed into one large canvas so the runtime can
//! bind a single texture per frame. Placement is a simple shelf packer: it
//! is deterministic for a given input order, which keeps packer output
//! reproducible.

use std::collections::HashSet;
use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use log::{debug, info};

use crate::blob::BlobWriter;
use crate::error::{Error, Result};
use crate::rect::Rectangle;

/// Reserved container ID of the atlas image itself.
pub const ATLAS_ID: &str = "atlas";

pub const DEFAULT_ATLAS_SIZE: u32 = 2048;

#[derive(Debug, Clone, Copy)]
pub struct AtlasPacker {
    width: u32,
    height: u32,
}

impl Default for AtlasPacker {
    fn default() -> Self {
        Self::new(DEFAULT_ATLAS_SIZE)
    }
}

impl AtlasPacker {
    pub fn new(size: u32) -> Self {
        Self::with_dimensions(size, size)
    }

    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Computes placements only, without touching pixel data.
    pub fn place(&self, sizes: &[(&str, u32, u32)]) -> Result<Vec<Rectangle>> {
        let mut seen = HashSet::with_capacity(sizes.len());
        let mut shelf = Shelf::default();
        let mut placements = Vec::with_capacity(sizes.len());

        for &(id, w, h) in sizes {
            if id == ATLAS_ID {
                return Err(Error::ReservedId(id.to_string()));
            }
            if !seen.insert(id) {
                return Err(Error::DuplicateId(id.to_string()));
            }
            if w == 0 || h == 0 {
                return Err(Error::EmptyImage(id.to_string()));
            }
            if w > self.width || h > self.height {
                return Err(Error::AtlasFull(id.to_string()));
            }

            if shelf.x + w > self.width {
                // start the next shelf below the tallest image of this one
                shelf.y += shelf.height;
                shelf.x = 0;
                shelf.height = 0;
            }
            if shelf.y + h > self.height {
                return Err(Error::AtlasFull(id.to_string()));
            }

            placements.push(Rectangle::new(
                shelf.x as i32,
                shelf.y as i32,
                w as i32,
                h as i32,
            ));
            shelf.x += w;
            shelf.height = shelf.height.max(h);
        }

        Ok(placements)
    }

    /// Packs every image into one canvas of this packer's size.
    pub fn pack(&self, images: &[(String, RgbaImage)]) -> Result<PackedAtlas> {
        let sizes: Vec<(&str, u32, u32)> = images
            .iter()
            .map(|(id, img)| (id.as_str(), img.width(), img.height()))
            .collect();
        let placements = self.place(&sizes)?;

        let mut canvas = RgbaImage::new(self.width, self.height);
        let mut rects = Vec::with_capacity(images.len());
        for ((id, img), rect) in images.iter().zip(placements) {
            image::imageops::replace(&mut canvas, img, rect.x as i64, rect.y as i64);
            debug!("Placed '{}' at {:?}", id, rect);
            rects.push((id.clone(), rect));
        }

        info!(
            "Packed {} images into a {}x{} atlas",
            rects.len(),
            self.width,
            self.height
        );

        Ok(PackedAtlas {
            image: canvas,
            rects,
        })
    }
}

#[derive(Debug, Default)]
struct Shelf {
    x: u32,
    y: u32,
    height: u32,
}

/// Result of packing: the atlas canvas plus one rectangle per input image,
/// in input order.
#[derive(Debug, Clone)]
pub struct PackedAtlas {
    pub image: RgbaImage,
    pub rects: Vec<(String, Rectangle)>,
}

impl PackedAtlas {
    pub fn rect(&self, id: &str) -> Option<Rectangle> {
        self.rects
            .iter()
            .find(|(rect_id, _)| rect_id == id)
            .map(|(_, rect)| *rect)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// Stores the atlas PNG under [`ATLAS_ID`] and every placement under its
    /// image's ID.
    pub fn append_to(&self, writer: &mut BlobWriter) -> Result<()> {
        writer.append(ATLAS_ID, self.encode_png()?)?;
        for (id, rect) in &self.rects {
            writer.append(id.clone(), rect.to_le_bytes().to_vec())?;
        }
        Ok(())
    }
}

/// Bounding box of every pixel with non-zero alpha, or `None` for a fully
/// transparent image. Collision boxes are derived from mask layers this way.
pub fn opaque_bounds(img: &RgbaImage) -> Option<Rectangle> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut any = false;

    for (x, y, pixel) in img.enumerate_pixels() {
        if pixel[3] != 0 {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    any.then(|| {
        Rectangle::new(
            min_x as i32,
            min_y as i32,
            (max_x - min_x + 1) as i32,
            (max_y - min_y + 1) as i32,
        )
    })
}
