//! OpenGL implementation of [`BatchBackend`] on top of `glow`.

use std::sync::Arc;

use cgmath::Matrix4;
use glow::HasContext;
use image::RgbaImage;
use log::{debug, info};

use crate::batch::BatchBackend;
use crate::error::{Error, Result};
use crate::shaders::ShaderProgram;
use crate::textures::Texture;

/// One vertex attribute read from its own tightly packed buffer.
#[derive(Debug, Clone)]
pub struct Layout {
    pub index: u32,
    pub size: i32,
    pub gl_type: u32,
    pub normalized: bool,
}

impl Layout {
    pub const fn new(index: u32, size: i32, gl_type: u32, normalized: bool) -> Self {
        Self {
            index,
            size,
            gl_type,
            normalized,
        }
    }

    fn bind(&self, gl: &glow::Context, buffer: glow::NativeBuffer) {
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.vertex_attrib_pointer_f32(self.index, self.size, self.gl_type, self.normalized, 0, 0);
            gl.enable_vertex_attrib_array(self.index);
        }
    }
}

pub const POSITION_LAYOUT: Layout = Layout::new(0, 2, glow::FLOAT, false);
pub const TEX_COORD_LAYOUT: Layout = Layout::new(1, 2, glow::FLOAT, false);

pub struct GlBackend {
    gl: Arc<glow::Context>,
    program: ShaderProgram,
    vao: glow::NativeVertexArray,
    projection_uniform: glow::NativeUniformLocation,
    atlas_uniform: glow::NativeUniformLocation,
    atlas: Option<Texture>,
}

impl GlBackend {
    pub fn new(gl: Arc<glow::Context>) -> Result<Self> {
        let program = ShaderProgram::sprite(&gl)?;
        let projection_uniform = program.uniform(&gl, "projection")?;
        let atlas_uniform = program.uniform(&gl, "atlas")?;

        let vao = unsafe { gl.create_vertex_array() }.map_err(Error::GpuResource)?;

        unsafe {
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);
        }

        info!("OpenGL sprite backend ready");
        Ok(Self {
            gl,
            program,
            vao,
            projection_uniform,
            atlas_uniform,
            atlas: None,
        })
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn set_viewport(&self, width: i32, height: i32) {
        unsafe { self.gl.viewport(0, 0, width, height) };
    }

    /// Deletes the atlas, shader program and vertex array. Must run while
    /// the context is still current.
    pub fn destroy(&mut self) {
        self.release_atlas();
        self.program.delete(&self.gl);
        unsafe { self.gl.delete_vertex_array(self.vao) };
        debug!("OpenGL sprite backend destroyed");
    }
}

impl BatchBackend for GlBackend {
    type Buffer = glow::NativeBuffer;

    fn create_buffer(&mut self, size_bytes: usize) -> Result<Self::Buffer> {
        let size = i32::try_from(size_bytes).map_err(|_| {
            Error::GpuResource(format!("buffer of {} bytes is too large", size_bytes))
        })?;

        unsafe {
            let buffer = self.gl.create_buffer().map_err(Error::GpuResource)?;
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl
                .buffer_data_size(glow::ARRAY_BUFFER, size, glow::STREAM_DRAW);

            if self.gl.get_error() == glow::OUT_OF_MEMORY {
                self.gl.delete_buffer(buffer);
                return Err(Error::GpuResource(format!(
                    "out of memory allocating {} byte buffer",
                    size_bytes
                )));
            }
            Ok(buffer)
        }
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) };
    }

    fn upload(&mut self, buffer: &Self::Buffer, data: &[u8]) {
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(*buffer));
            self.gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, data);
        }
    }

    fn upload_atlas(&mut self, atlas: &RgbaImage) -> Result<()> {
        self.release_atlas();
        self.atlas = Some(Texture::from_image(&self.gl, atlas)?);
        Ok(())
    }

    fn release_atlas(&mut self) {
        if let Some(texture) = self.atlas.take() {
            texture.delete(&self.gl);
        }
    }

    fn clear(&mut self, r: u8, g: u8, b: u8) {
        unsafe {
            self.gl.clear_color(
                r as f32 / 255.0,
                g as f32 / 255.0,
                b as f32 / 255.0,
                1.0,
            );
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn draw(
        &mut self,
        vertices: &Self::Buffer,
        tex_coords: &Self::Buffer,
        projection: &Matrix4<f32>,
        vertex_count: usize,
    ) -> Result<()> {
        let atlas = self
            .atlas
            .as_ref()
            .ok_or_else(|| Error::GpuResource("no atlas texture uploaded".to_string()))?;
        let gl = &self.gl;

        unsafe {
            gl.use_program(Some(self.program.program));
            gl.bind_vertex_array(Some(self.vao));

            POSITION_LAYOUT.bind(gl, *vertices);
            TEX_COORD_LAYOUT.bind(gl, *tex_coords);

            atlas.bind(gl, 0);
            gl.uniform_1_i32(Some(&self.atlas_uniform), 0);

            let projection: &[f32; 16] = projection.as_ref();
            gl.uniform_matrix_4_f32_slice(Some(&self.projection_uniform), false, projection);

            gl.draw_arrays(glow::TRIANGLES, 0, vertex_count as i32);
        }
        Ok(())
    }
}
