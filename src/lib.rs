//! Resource container, texture atlas and batched sprite rendering for a 2D
//! side scroller.
//!
//! All game resources live in one binary container ([`blob`]). Sprites are
//! packed offline into a single atlas image ([`atlas`]); at runtime the
//! [`loader`] uploads that atlas once and hands out [`graphics::Image`]
//! regions of it. Drawing goes through the [`graphics::Graphics`] trait,
//! implemented by the GPU batcher ([`batch`] + [`opengl`]) and by the CPU
//! reference blitter ([`blit`]). The [`camera`] maps world coordinates to
//! window coordinates.

pub mod atlas;
pub mod batch;
pub mod blit;
pub mod blob;
pub mod camera;
pub mod config;
pub mod error;
pub mod graphics;
pub mod loader;
pub mod opengl;
pub mod rect;
pub mod shaders;
pub mod sound;
pub mod textures;

pub use error::{Error, Result};
