//! The drawing interface shared by the batched and the immediate backends.
//!
//! Game code only talks to [`Graphics`]; whether a draw is submitted right
//! away or accumulated until [`Graphics::flush`] is a backend detail.

use image::RgbaImage;

use crate::camera::WindowCamera;
use crate::error::Result;
use crate::rect::Rectangle;

/// A sprite: a region of the shared atlas texture.
///
/// Carries both views of the region, pixel space for blit backends and
/// normalized texture coordinates for triangle backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Image {
    source: Rectangle,
    uv: [f32; 4],
}

impl Image {
    /// `source` must lie inside an atlas of `atlas_width` x `atlas_height`.
    pub fn new(source: Rectangle, atlas_width: u32, atlas_height: u32) -> Self {
        let pixel_w = 1.0 / atlas_width as f32;
        let pixel_h = 1.0 / atlas_height as f32;
        Self {
            source,
            uv: [
                source.x as f32 * pixel_w,
                source.y as f32 * pixel_h,
                source.right() as f32 * pixel_w,
                source.bottom() as f32 * pixel_h,
            ],
        }
    }

    pub fn source(&self) -> Rectangle {
        self.source
    }

    /// `(u0, v0, u1, v1)`; `(u0, v0)` is the top-left corner.
    pub fn uv(&self) -> [f32; 4] {
        self.uv
    }

    pub fn size(&self) -> (i32, i32) {
        (self.source.width, self.source.height)
    }

    pub fn draw_at(&self, graphics: &mut dyn Graphics, x: i32, y: i32) {
        graphics.draw_image_at(self, x, y);
    }
}

pub trait Graphics {
    fn clear_screen(&mut self, r: u8, g: u8, b: u8);

    /// Draws `image` with its top-left corner at world position `(x, y)`.
    fn draw_image_at(&mut self, image: &Image, x: i32, y: i32);

    /// Submits everything drawn since the last flush.
    fn flush(&mut self) -> Result<()>;

    fn camera(&self) -> &WindowCamera;
    fn camera_mut(&mut self) -> &mut WindowCamera;

    /// Makes `atlas` the texture every [`Image`] refers to.
    fn upload_atlas(&mut self, atlas: &RgbaImage) -> Result<()>;
    fn release_atlas(&mut self);
}
