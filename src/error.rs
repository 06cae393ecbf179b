//! Error types shared by the container, packer, loader and renderers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Container bytes are truncated or otherwise malformed
    #[error("Malformed resource container: {0}")]
    Format(String),

    /// A requested ID is absent from the container
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Payload exists but is not valid for the expected type
    #[error("Cannot decode resource '{id}': {reason}")]
    Decode { id: String, reason: String },

    /// Texture, buffer or shader creation failed
    #[error("GPU resource error: {0}")]
    GpuResource(String),

    #[error("Texture atlas is full, cannot place '{0}'")]
    AtlasFull(String),

    #[error("Image '{0}' has zero width or height")]
    EmptyImage(String),

    #[error("Duplicate resource ID: {0}")]
    DuplicateId(String),

    #[error("Resource ID '{0}' is reserved")]
    ReservedId(String),

    #[error("Invalid resource ID: {0}")]
    InvalidId(String),

    #[error("Asset loader is closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn decode(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Decode {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
