use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};

use crate::atlas::ATLAS_ID;
use crate::blob::Blob;
use crate::error::{Error, Result};
use crate::graphics::{Graphics, Image};
use crate::rect::Rectangle;
use crate::sound::{decode_wav, AudioBridge, Sound};

/// What the gameplay layer needs from an asset loader.
pub trait AssetSource {
    fn load_image(&mut self, id: &str) -> Result<Image>;
    fn load_sound(&mut self, id: &str) -> Result<Sound>;
    fn load_rectangle(&self, id: &str) -> Result<Rectangle>;
}

/// Dimensions of the atlas texture uploaded at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasTexture {
    pub width: u32,
    pub height: u32,
}

impl AtlasTexture {
    pub fn bounds(&self) -> Rectangle {
        Rectangle::new(0, 0, self.width as i32, self.height as i32)
    }
}

/// Decodes container payloads on first use and caches the results by ID.
pub struct AssetLoader {
    resources: Blob,
    atlas: AtlasTexture,
    audio: AudioBridge,

    images: HashMap<String, Image>,
    sounds: HashMap<String, Sound>,

    closed: bool,
}

impl AssetLoader {
    pub fn open<P: AsRef<Path>>(
        path: P,
        graphics: &mut dyn Graphics,
        audio: AudioBridge,
    ) -> Result<Self> {
        let resources = Blob::open(path)?;
        Self::from_blob(resources, graphics, audio)
    }

    /// Decodes the atlas image and uploads it through `graphics`. Must run
    /// before any image is loaded.
    pub fn from_blob(resources: Blob, graphics: &mut dyn Graphics, audio: AudioBridge) -> Result<Self> {
        let atlas_bytes = resources
            .get_by_id(ATLAS_ID)
            .ok_or_else(|| Error::ResourceNotFound(ATLAS_ID.to_string()))?;

        let atlas_image = image::load_from_memory(atlas_bytes)
            .map_err(|e| Error::decode(ATLAS_ID, e.to_string()))?
            .to_rgba8();
        let (width, height) = atlas_image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::decode(ATLAS_ID, "atlas image is empty"));
        }

        graphics.upload_atlas(&atlas_image)?;
        info!("Uploaded {}x{} texture atlas", width, height);

        Ok(Self {
            resources,
            atlas: AtlasTexture { width, height },
            audio,
            images: HashMap::new(),
            sounds: HashMap::new(),
            closed: false,
        })
    }

    pub fn atlas(&self) -> AtlasTexture {
        self.atlas
    }

    pub fn resources(&self) -> &Blob {
        &self.resources
    }

    pub fn cached_images(&self) -> usize {
        self.images.len()
    }

    pub fn cached_sounds(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn payload(&self, id: &str) -> Result<&[u8]> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.resources
            .get_by_id(id)
            .ok_or_else(|| Error::ResourceNotFound(id.to_string()))
    }

    /// Releases the atlas and every cached resource. Calling it again does
    /// nothing.
    pub fn close(&mut self, graphics: &mut dyn Graphics) {
        if self.closed {
            return;
        }
        graphics.release_atlas();
        debug!(
            "Released atlas, {} images and {} sounds",
            self.images.len(),
            self.sounds.len()
        );
        self.images.clear();
        self.sounds.clear();
        self.closed = true;
    }
}

impl AssetSource for AssetLoader {
    fn load_image(&mut self, id: &str) -> Result<Image> {
        if let Some(image) = self.images.get(id) {
            return Ok(*image);
        }

        let bounds = Rectangle::from_le_bytes(id, self.payload(id)?)?;
        if bounds.is_empty() {
            return Err(Error::decode(id, format!("empty image rectangle {:?}", bounds)));
        }
        if bounds.checked_right().is_none() || bounds.checked_bottom().is_none() {
            return Err(Error::decode(id, format!("image rectangle {:?} overflows", bounds)));
        }
        if !self.atlas.bounds().contains(&bounds) {
            return Err(Error::decode(
                id,
                format!(
                    "rectangle {:?} lies outside the {}x{} atlas",
                    bounds, self.atlas.width, self.atlas.height
                ),
            ));
        }

        let image = Image::new(bounds, self.atlas.width, self.atlas.height);
        debug!("Loaded image '{}' at {:?}", id, bounds);
        self.images.insert(id.to_string(), image);
        Ok(image)
    }

    fn load_sound(&mut self, id: &str) -> Result<Sound> {
        if let Some(sound) = self.sounds.get(id) {
            return Ok(sound.clone());
        }

        let pcm = decode_wav(id, self.payload(id)?)?;
        let sound = Sound::new(id, pcm, self.audio.clone());
        debug!("Loaded sound '{}' ({:?})", id, sound.length());
        self.sounds.insert(id.to_string(), sound.clone());
        Ok(sound)
    }

    fn load_rectangle(&self, id: &str) -> Result<Rectangle> {
        Rectangle::from_le_bytes(id, self.payload(id)?)
    }
}
