//! Container Pipeline Integration Tests
//!
//! These tests drive the public API the way the packer and the runtime do:
//! sprites are packed into an atlas, written into a container file, read
//! back by the asset loader and drawn through both `Graphics` backends.
//!
//! # Test Categories
//!
//! 1. **Container** - Records survive a trip through a file on disk
//! 2. **Atlas** - Packed placements are disjoint and inside the canvas
//! 3. **Loader + Blit** - Pixels drawn match the source sprites
//! 4. **Batching** - Vertex accounting and camera offsets on the GPU path
//!
//! ```sh
//! cargo test --test container_pipeline_integration
//! ```

use std::collections::HashMap;

use cgmath::Matrix4;
use image::{Rgba, RgbaImage};

use sprite_blob::atlas::{AtlasPacker, ATLAS_ID};
use sprite_blob::batch::{BatchBackend, BatchedGraphics, VERTICES_PER_SPRITE};
use sprite_blob::blit::BlitGraphics;
use sprite_blob::blob::{self, Blob, BlobWriter};
use sprite_blob::camera::WindowCamera;
use sprite_blob::graphics::{Graphics, Image};
use sprite_blob::loader::{AssetLoader, AssetSource};
use sprite_blob::rect::Rectangle;
use sprite_blob::sound::{encode_wav, AudioBridge, AudioCommand, Pcm};
use sprite_blob::{Error, Result};

// =============================================================================
// Helpers
// =============================================================================

fn checker(w: u32, h: u32, a: Rgba<u8>, b: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| if (x + y) % 2 == 0 { a } else { b })
}

fn sprites() -> Vec<(String, RgbaImage)> {
    vec![
        (
            "gopher".to_string(),
            checker(6, 4, Rgba([200, 10, 10, 255]), Rgba([10, 200, 10, 255])),
        ),
        (
            "cloud".to_string(),
            RgbaImage::from_pixel(5, 3, Rgba([250, 250, 250, 255])),
        ),
        (
            "rock".to_string(),
            checker(3, 3, Rgba([90, 90, 90, 255]), Rgba([0, 0, 0, 0])),
        ),
    ]
}

fn build_container(path: &std::path::Path) {
    let packed = AtlasPacker::new(32).pack(&sprites()).unwrap();
    let mut writer = BlobWriter::new();
    packed.append_to(&mut writer).unwrap();
    writer
        .append(
            "gopher collision",
            Rectangle::new(1, 1, 4, 3).to_le_bytes().to_vec(),
        )
        .unwrap();
    writer
        .append(
            "jump",
            encode_wav(&Pcm {
                channels: 1,
                sample_rate: 22050,
                bits_per_sample: 16,
                data: vec![0; 22050 * 2],
            }),
        )
        .unwrap();
    writer.append("music", vec![0x4f, 0x67, 0x67, 0x53]).unwrap();
    writer.save(path).unwrap();
}

/// Counts GPU work instead of performing it.
#[derive(Default)]
struct CountingBackend {
    next: u32,
    live: Vec<u32>,
    draws: Vec<usize>,
    uploads: usize,
    atlas: Option<(u32, u32)>,
}

impl BatchBackend for CountingBackend {
    type Buffer = u32;

    fn create_buffer(&mut self, _size_bytes: usize) -> Result<u32> {
        self.next += 1;
        self.live.push(self.next);
        Ok(self.next)
    }

    fn delete_buffer(&mut self, buffer: u32) {
        self.live.retain(|b| *b != buffer);
    }

    fn upload(&mut self, _buffer: &u32, _data: &[u8]) {
        self.uploads += 1;
    }

    fn upload_atlas(&mut self, atlas: &RgbaImage) -> Result<()> {
        self.atlas = Some(atlas.dimensions());
        Ok(())
    }

    fn release_atlas(&mut self) {
        self.atlas = None;
    }

    fn clear(&mut self, _r: u8, _g: u8, _b: u8) {}

    fn draw(
        &mut self,
        _vertices: &u32,
        _tex_coords: &u32,
        _projection: &Matrix4<f32>,
        vertex_count: usize,
    ) -> Result<()> {
        self.draws.push(vertex_count);
        Ok(())
    }
}

// =============================================================================
// 1. Container
// =============================================================================

#[test]
fn container_round_trips_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.blob");

    let records: HashMap<String, Vec<u8>> = [
        ("a", vec![1u8, 2, 3]),
        ("empty", vec![]),
        ("big", (0..=255u8).cycle().take(70_000).collect()),
        ("ünïcödé", vec![9]),
    ]
    .into_iter()
    .map(|(id, data)| (id.to_string(), data))
    .collect();

    let mut writer = BlobWriter::new();
    for (id, data) in &records {
        writer.append(id.clone(), data.clone()).unwrap();
    }
    writer.save(&path).unwrap();

    let blob = Blob::open(&path).unwrap();
    let read: HashMap<String, Vec<u8>> = blob
        .iter()
        .map(|(id, data)| (id.to_string(), data.to_vec()))
        .collect();
    assert_eq!(read, records);
}

#[test]
fn named_bytes_and_rectangles_scenario() {
    let bytes = blob::write([
        ("a", vec![1u8, 2, 3]),
        ("rect_x", Rectangle::new(10, 20, 30, 40).to_le_bytes().to_vec()),
    ])
    .unwrap();
    let blob = Blob::read(bytes).unwrap();

    assert_eq!(blob.get_by_id("a"), Some(&[1u8, 2, 3][..]));
    assert_eq!(blob.get_by_id("missing"), None);
    let rect = Rectangle::from_le_bytes("rect_x", blob.get_by_id("rect_x").unwrap()).unwrap();
    assert_eq!(rect, Rectangle::new(10, 20, 30, 40));
}

#[test]
fn truncated_container_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cut.blob");
    build_container(&path);

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
    assert!(matches!(Blob::open(&path), Err(Error::Format(_))));
}

// =============================================================================
// 2. Atlas
// =============================================================================

#[test]
fn three_sprites_fit_a_small_canvas() {
    let rects = AtlasPacker::new(64)
        .place(&[("a", 10, 10), ("b", 10, 10), ("c", 10, 10)])
        .unwrap();

    assert_eq!(rects.len(), 3);
    for (i, r) in rects.iter().enumerate() {
        assert_eq!((r.width, r.height), (10, 10));
        assert!(r.x >= 0 && r.y >= 0 && r.right() <= 64 && r.bottom() <= 64);
        for other in &rects[i + 1..] {
            assert!(!r.overlaps(other), "{:?} overlaps {:?}", r, other);
        }
    }
}

#[test]
fn atlas_pixels_match_their_sources() {
    let packed = AtlasPacker::new(32).pack(&sprites()).unwrap();
    for (id, source) in sprites() {
        let rect = packed.rect(&id).unwrap();
        for (x, y, pixel) in source.enumerate_pixels() {
            let placed = packed
                .image
                .get_pixel(rect.x as u32 + x, rect.y as u32 + y);
            assert_eq!(placed, pixel, "{} at ({}, {})", id, x, y);
        }
    }
}

// =============================================================================
// 3. Loader + Blit
// =============================================================================

#[test]
fn loader_and_blitter_reproduce_sprites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.blob");
    build_container(&path);

    let mut graphics = BlitGraphics::new(WindowCamera::new(40, 20));
    let (audio, _rx) = AudioBridge::new();
    let mut loader = AssetLoader::open(&path, &mut graphics, audio).unwrap();
    assert!(loader.resources().contains(ATLAS_ID));

    let gopher = loader.load_image("gopher").unwrap();
    let rock = loader.load_image("rock").unwrap();
    assert_eq!(gopher.size(), (6, 4));

    graphics.clear_screen(0, 95, 83);
    gopher.draw_at(&mut graphics, 2, 3);
    rock.draw_at(&mut graphics, 20, 10);
    graphics.flush().unwrap();

    let frame = graphics.frame();
    let sources = sprites();
    let gopher_src = &sources[0].1;
    for (x, y, pixel) in gopher_src.enumerate_pixels() {
        assert_eq!(frame.get_pixel(2 + x, 3 + y), pixel);
    }
    // transparent checker cells of the rock keep the background
    assert_eq!(*frame.get_pixel(20, 10), Rgba([90, 90, 90, 255]));
    assert_eq!(*frame.get_pixel(21, 10), Rgba([0, 95, 83, 255]));
    assert_eq!(*frame.get_pixel(0, 0), Rgba([0, 95, 83, 255]));

    loader.close(&mut graphics);
}

#[test]
fn loader_serves_rectangles_and_sounds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.blob");
    build_container(&path);

    let mut graphics = BlitGraphics::new(WindowCamera::new(8, 8));
    let (audio, rx) = AudioBridge::new();
    let mut loader = AssetLoader::open(&path, &mut graphics, audio).unwrap();

    assert_eq!(
        loader.load_rectangle("gopher collision").unwrap(),
        Rectangle::new(1, 1, 4, 3)
    );

    let jump = loader.load_sound("jump").unwrap();
    assert_eq!(jump.length(), std::time::Duration::from_secs(1));
    jump.play_once();
    match rx.try_recv().unwrap() {
        AudioCommand::PlayOnce { id, .. } => assert_eq!(id, "jump"),
    }

    // raw payloads stay reachable for collaborators
    assert_eq!(loader.resources().get_by_id("music"), Some(&b"OggS"[..]));
    assert!(matches!(loader.load_sound("music"), Err(Error::Decode { .. })));
    assert!(matches!(
        loader.load_image("missing"),
        Err(Error::ResourceNotFound(_))
    ));
}

#[test]
fn container_without_atlas_cannot_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_atlas.blob");
    let mut writer = BlobWriter::new();
    writer.append("music", vec![1u8]).unwrap();
    writer.save(&path).unwrap();

    let mut graphics = BlitGraphics::new(WindowCamera::new(8, 8));
    let (audio, _rx) = AudioBridge::new();
    let result = AssetLoader::open(&path, &mut graphics, audio);
    assert!(matches!(result, Err(Error::ResourceNotFound(ref id)) if id == ATLAS_ID));
}

// =============================================================================
// 4. Batching
// =============================================================================

#[test]
fn batched_quad_follows_the_camera_offset() {
    let mut camera = WindowCamera::new(800, 600);
    camera.set_world_position(Rectangle::new(-100, -50, 800, 600));
    assert_eq!(camera.offset(), (100, 50));
    assert_eq!(camera.offset(), camera.offset());

    let mut graphics = BatchedGraphics::new(CountingBackend::default(), camera);
    let image = Image::new(Rectangle::new(0, 0, 16, 24), 64, 64);
    image.draw_at(&mut graphics, 5, 5);

    let vertices = graphics.batch().vertices();
    let min_x = vertices.iter().map(|v| v[0]).fold(f32::MAX, f32::min);
    let max_x = vertices.iter().map(|v| v[0]).fold(f32::MIN, f32::max);
    let min_y = vertices.iter().map(|v| v[1]).fold(f32::MAX, f32::min);
    let max_y = vertices.iter().map(|v| v[1]).fold(f32::MIN, f32::max);
    assert_eq!(min_x, 105.0);
    assert_eq!(min_y, 55.0);
    assert_eq!((max_x - min_x, max_y - min_y), (16.0, 24.0));
}

#[test]
fn frames_submit_once_and_reuse_buffers() {
    let mut graphics = BatchedGraphics::new(CountingBackend::default(), WindowCamera::new(320, 240));
    let image = Image::new(Rectangle::new(0, 0, 8, 8), 64, 64);

    for frame in 0..3 {
        graphics.clear_screen(0, 0, 0);
        for i in 0..10 {
            image.draw_at(&mut graphics, i * 8, frame);
        }
        assert_eq!(graphics.batch().vertex_count(), 10 * VERTICES_PER_SPRITE);
        assert_eq!(graphics.batch().tex_coords().len(), 10 * VERTICES_PER_SPRITE);
        graphics.flush().unwrap();
        assert_eq!(graphics.batch().vertex_count(), 0);
    }

    let capacities = graphics.buffer_capacities();
    graphics.flush().unwrap();
    assert_eq!(graphics.buffer_capacities(), capacities);
    assert_eq!(graphics.submissions(), 3);

    let backend = graphics.into_backend();
    assert_eq!(backend.draws, vec![60, 60, 60]);
    assert_eq!(backend.uploads, 6);
    assert!(backend.live.is_empty());
}
