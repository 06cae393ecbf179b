//! Per-frame sprite batching.
//!
//! Every `draw_image_at` during a frame only appends two triangles to a
//! [`DrawBatch`]. [`BatchedGraphics::flush`] uploads the whole batch and
//! submits it with a single draw call, then resets the batch length while
//! keeping its allocation for the next frame.

use cgmath::Matrix4;
use image::RgbaImage;
use log::debug;

use crate::camera::WindowCamera;
use crate::error::Result;
use crate::graphics::{Graphics, Image};

pub const VERTICES_PER_SPRITE: usize = 6;

/// CPU side accumulation of one frame's sprites.
#[derive(Debug, Default, Clone)]
pub struct DrawBatch {
    vertices: Vec<[f32; 2]>,
    tex_coords: Vec<[f32; 2]>,
}

impl DrawBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `width x height` quad with its top-left corner at screen
    /// position `(x, y)`, shifted by `pixel_offset` for rasterization
    /// alignment.
    pub fn push_sprite(&mut self, image: &Image, x: i32, y: i32, pixel_offset: f32) {
        let (width, height) = image.size();
        let x0 = x as f32 + pixel_offset;
        let y0 = y as f32 + pixel_offset;
        let x1 = x0 + width as f32;
        let y1 = y0 + height as f32;
        let [u0, v0, u1, v1] = image.uv();

        self.vertices.extend_from_slice(&[
            [x0, y0],
            [x0, y1],
            [x1, y0],
            [x1, y0],
            [x0, y1],
            [x1, y1],
        ]);
        self.tex_coords.extend_from_slice(&[
            [u0, v0],
            [u0, v1],
            [u1, v0],
            [u1, v0],
            [u0, v1],
            [u1, v1],
        ]);
    }

    pub fn vertices(&self) -> &[[f32; 2]] {
        &self.vertices
    }

    pub fn tex_coords(&self) -> &[[f32; 2]] {
        &self.tex_coords
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn sprite_count(&self) -> usize {
        self.vertices.len() / VERTICES_PER_SPRITE
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn tex_coord_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.tex_coords)
    }

    /// Allocated room, in vertices, of the smaller of the two arrays.
    pub fn capacity(&self) -> usize {
        self.vertices.capacity().min(self.tex_coords.capacity())
    }

    /// Drops the contents but keeps the allocations.
    pub fn reset_length(&mut self) {
        self.vertices.clear();
        self.tex_coords.clear();
    }
}

/// The GPU operations a batched backend needs.
pub trait BatchBackend {
    type Buffer;

    /// Added to every vertex position so that axis-aligned quads hit pixel
    /// boundaries exactly. Depends on the API's rasterization rules.
    fn pixel_offset(&self) -> f32 {
        0.0
    }

    fn create_buffer(&mut self, size_bytes: usize) -> Result<Self::Buffer>;
    fn delete_buffer(&mut self, buffer: Self::Buffer);
    fn upload(&mut self, buffer: &Self::Buffer, data: &[u8]);

    fn upload_atlas(&mut self, atlas: &RgbaImage) -> Result<()>;
    fn release_atlas(&mut self);

    fn clear(&mut self, r: u8, g: u8, b: u8);

    /// Draws `vertex_count` vertices as a triangle list.
    fn draw(
        &mut self,
        vertices: &Self::Buffer,
        tex_coords: &Self::Buffer,
        projection: &Matrix4<f32>,
        vertex_count: usize,
    ) -> Result<()>;
}

/// A GPU buffer that only ever grows.
#[derive(Debug)]
pub struct GpuBuffer<T> {
    handle: Option<T>,
    capacity: usize,
}

impl<T> Default for GpuBuffer<T> {
    fn default() -> Self {
        Self {
            handle: None,
            capacity: 0,
        }
    }
}

impl<T> GpuBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn handle(&self) -> Option<&T> {
        self.handle.as_ref()
    }

    /// Reallocates if the buffer holds fewer than `size_bytes`. The old
    /// buffer is deleted before the new one is created. Returns whether a
    /// reallocation happened.
    pub fn ensure_capacity<B>(&mut self, backend: &mut B, size_bytes: usize) -> Result<bool>
    where
        B: BatchBackend<Buffer = T>,
    {
        if self.handle.is_some() && self.capacity >= size_bytes {
            return Ok(false);
        }

        if let Some(old) = self.handle.take() {
            backend.delete_buffer(old);
        }
        self.capacity = 0;

        let buffer = backend.create_buffer(size_bytes)?;
        self.handle = Some(buffer);
        self.capacity = size_bytes;
        Ok(true)
    }

    pub fn release<B>(&mut self, backend: &mut B)
    where
        B: BatchBackend<Buffer = T>,
    {
        if let Some(buffer) = self.handle.take() {
            backend.delete_buffer(buffer);
        }
        self.capacity = 0;
    }
}

/// [`Graphics`] implementation that defers all GPU work to `flush`.
pub struct BatchedGraphics<B: BatchBackend> {
    backend: B,
    camera: WindowCamera,
    batch: DrawBatch,
    vertex_buffer: GpuBuffer<B::Buffer>,
    tex_coord_buffer: GpuBuffer<B::Buffer>,
    submissions: u64,
}

impl<B: BatchBackend> BatchedGraphics<B> {
    pub fn new(backend: B, camera: WindowCamera) -> Self {
        Self {
            backend,
            camera,
            batch: DrawBatch::new(),
            vertex_buffer: GpuBuffer::new(),
            tex_coord_buffer: GpuBuffer::new(),
            submissions: 0,
        }
    }

    pub fn batch(&self) -> &DrawBatch {
        &self.batch
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Byte capacities of the vertex and texture coordinate buffers.
    pub fn buffer_capacities(&self) -> (usize, usize) {
        (self.vertex_buffer.capacity(), self.tex_coord_buffer.capacity())
    }

    /// Number of draw submissions made so far.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Releases the vertex and texture coordinate buffers.
    pub fn release_buffers(&mut self) {
        self.vertex_buffer.release(&mut self.backend);
        self.tex_coord_buffer.release(&mut self.backend);
    }

    pub fn into_backend(mut self) -> B {
        self.release_buffers();
        self.backend
    }
}

impl<B: BatchBackend> Graphics for BatchedGraphics<B> {
    fn clear_screen(&mut self, r: u8, g: u8, b: u8) {
        self.backend.clear(r, g, b);
    }

    fn draw_image_at(&mut self, image: &Image, x: i32, y: i32) {
        let (dx, dy) = self.camera.offset();
        let pixel_offset = self.backend.pixel_offset();
        self.batch.push_sprite(image, x + dx, y + dy, pixel_offset);
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let vertex_bytes = self.batch.vertex_bytes();
        let tex_coord_bytes = self.batch.tex_coord_bytes();

        if self
            .vertex_buffer
            .ensure_capacity(&mut self.backend, vertex_bytes.len())?
        {
            debug!("Vertex buffer grown to {} bytes", vertex_bytes.len());
        }
        if self
            .tex_coord_buffer
            .ensure_capacity(&mut self.backend, tex_coord_bytes.len())?
        {
            debug!(
                "Texture coordinate buffer grown to {} bytes",
                tex_coord_bytes.len()
            );
        }

        // both handles exist after ensure_capacity succeeded
        if let (Some(vertices), Some(tex_coords)) =
            (self.vertex_buffer.handle(), self.tex_coord_buffer.handle())
        {
            self.backend.upload(vertices, vertex_bytes);
            self.backend.upload(tex_coords, tex_coord_bytes);
            self.backend.draw(
                vertices,
                tex_coords,
                &self.camera.projection(),
                self.batch.vertex_count(),
            )?;
            self.submissions += 1;
        }

        self.batch.reset_length();
        Ok(())
    }

    fn camera(&self) -> &WindowCamera {
        &self.camera
    }

    fn camera_mut(&mut self) -> &mut WindowCamera {
        &mut self.camera
    }

    fn upload_atlas(&mut self, atlas: &RgbaImage) -> Result<()> {
        self.backend.upload_atlas(atlas)
    }

    fn release_atlas(&mut self) {
        self.backend.release_atlas();
    }
}
