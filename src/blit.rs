//! Immediate-mode backend that blits atlas regions into a CPU framebuffer.
//!
//! Each draw is applied right away in pixel space, so the result is the
//! pixel-exact reference for what a frame should look like.

use image::{Rgba, RgbaImage};
use log::warn;

use crate::camera::WindowCamera;
use crate::error::Result;
use crate::graphics::{Graphics, Image};

pub struct BlitGraphics {
    camera: WindowCamera,
    atlas: Option<RgbaImage>,
    frame: RgbaImage,
}

impl BlitGraphics {
    pub fn new(camera: WindowCamera) -> Self {
        let (w, h) = camera.window_size();
        Self {
            camera,
            atlas: None,
            frame: RgbaImage::new(w.max(0) as u32, h.max(0) as u32),
        }
    }

    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    pub fn into_frame(self) -> RgbaImage {
        self.frame
    }

    fn ensure_frame_size(&mut self) {
        let (w, h) = self.camera.window_size();
        let (w, h) = (w.max(0) as u32, h.max(0) as u32);
        if self.frame.dimensions() != (w, h) {
            self.frame = RgbaImage::new(w, h);
        }
    }
}

impl Graphics for BlitGraphics {
    fn clear_screen(&mut self, r: u8, g: u8, b: u8) {
        self.ensure_frame_size();
        for pixel in self.frame.pixels_mut() {
            *pixel = Rgba([r, g, b, 255]);
        }
    }

    fn draw_image_at(&mut self, image: &Image, x: i32, y: i32) {
        let Some(atlas) = &self.atlas else {
            warn!("Sprite drawn before an atlas was uploaded");
            return;
        };
        let (dx, dy) = self.camera.offset();
        let source = image.source();

        // part of the source that actually lies in the atlas
        let src_left = (source.x as i64).max(0);
        let src_top = (source.y as i64).max(0);
        let src_right = (source.x as i64 + source.width as i64).min(atlas.width() as i64);
        let src_bottom = (source.y as i64 + source.height as i64).min(atlas.height() as i64);

        // screen = atlas + origin
        let origin_x = x as i64 + dx as i64 - source.x as i64;
        let origin_y = y as i64 + dy as i64 - source.y as i64;

        // clip against the framebuffer
        let left = (src_left + origin_x).max(0);
        let top = (src_top + origin_y).max(0);
        let right = (src_right + origin_x).min(self.frame.width() as i64);
        let bottom = (src_bottom + origin_y).min(self.frame.height() as i64);

        for sy in top..bottom {
            for sx in left..right {
                let src = atlas.get_pixel((sx - origin_x) as u32, (sy - origin_y) as u32);
                let dst = self.frame.get_pixel_mut(sx as u32, sy as u32);
                *dst = blend_over(*src, *dst);
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn camera(&self) -> &WindowCamera {
        &self.camera
    }

    fn camera_mut(&mut self) -> &mut WindowCamera {
        &mut self.camera
    }

    fn upload_atlas(&mut self, atlas: &RgbaImage) -> Result<()> {
        self.atlas = Some(atlas.clone());
        Ok(())
    }

    fn release_atlas(&mut self) {
        self.atlas = None;
    }
}

/// Source-over alpha blending, the same equation the GPU path enables.
fn blend_over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let alpha = src[3] as u32;
    if alpha == 255 {
        return src;
    }
    if alpha == 0 {
        return dst;
    }

    let inv = 255 - alpha;
    let mix = |s: u8, d: u8| ((s as u32 * alpha + d as u32 * inv + 127) / 255) as u8;
    Rgba([
        mix(src[0], dst[0]),
        mix(src[1], dst[1]),
        mix(src[2], dst[2]),
        (alpha + (dst[3] as u32 * inv + 127) / 255) as u8,
    ])
}
