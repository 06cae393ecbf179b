use glow::HasContext;
use image::RgbaImage;

use crate::error::{Error, Result};

/// An RGBA texture living on the GPU.
pub struct Texture {
    pub texture: glow::NativeTexture,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    /// Uploads `image` as is. Row 0 is the top of the image, so a texture
    /// coordinate `v` of 0 samples the top row.
    ///
    /// Sprites are sampled with nearest filtering and clamped edges so that
    /// neighbouring atlas regions never bleed into each other.
    pub fn from_image(gl: &glow::Context, image: &RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        unsafe {
            let texture = gl.create_texture().map_err(Error::GpuResource)?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));

            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::NEAREST as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::NEAREST as i32,
            );

            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(image.as_raw())),
            );

            if gl.get_error() == glow::OUT_OF_MEMORY {
                gl.delete_texture(texture);
                return Err(Error::GpuResource(format!(
                    "out of memory uploading {}x{} texture",
                    width, height
                )));
            }

            Ok(Texture {
                texture,
                width,
                height,
            })
        }
    }

    pub fn bind(&self, gl: &glow::Context, unit: u32) {
        unsafe {
            gl.active_texture(glow::TEXTURE0 + unit);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.texture));
        }
    }

    pub fn delete(self, gl: &glow::Context) {
        unsafe { gl.delete_texture(self.texture) };
    }
}
