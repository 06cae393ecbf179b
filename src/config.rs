//! Runtime settings loaded from an INI file.
//!
//! ```ini
//! [resources]
//! blob = resources.blob
//!
//! [window]
//! width = 800
//! height = 600
//! title = sprite_blob
//!
//! [render]
//! clear_r = 0
//! clear_g = 95
//! clear_b = 83
//! frame_rate = 65
//! ```
//!
//! Missing keys keep their defaults. A missing file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use configparser::ini::Ini;
use log::info;

use crate::error::{Error, Result};

const DEFAULT_BLOB_PATH: &str = "resources.blob";
const DEFAULT_WINDOW_WIDTH: u32 = 800;
const DEFAULT_WINDOW_HEIGHT: u32 = 600;
const DEFAULT_TITLE: &str = "sprite_blob";
const DEFAULT_CLEAR_COLOR: (u8, u8, u8) = (0, 95, 83);
const DEFAULT_FRAME_RATE: u32 = 65;
pub const DEFAULT_CONFIG_PATH: &str = "./sprite_blob.ini";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub blob: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
    pub title: String,
    pub clear_color: (u8, u8, u8),
    /// Fixed update rate in frames per second.
    pub frame_rate: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            blob: PathBuf::from(DEFAULT_BLOB_PATH),
            window_width: DEFAULT_WINDOW_WIDTH,
            window_height: DEFAULT_WINDOW_HEIGHT,
            title: DEFAULT_TITLE.to_string(),
            clear_color: DEFAULT_CLEAR_COLOR,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

impl RuntimeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_ini(&ini)?;
        info!(
            "Loaded config: blob={:?}, {}x{} window, {} fps",
            config.blob, config.window_width, config.window_height, config.frame_rate
        );
        Ok(config)
    }

    pub fn from_ini_str(text: &str) -> Result<Self> {
        let mut ini = Ini::new();
        ini.read(text.to_string()).map_err(Error::Config)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self> {
        let mut config = Self::default();

        if let Some(blob) = ini.get("resources", "blob") {
            config.blob = PathBuf::from(blob);
        }

        if let Some(width) = uint(ini, "window", "width")? {
            config.window_width = width;
        }
        if let Some(height) = uint(ini, "window", "height")? {
            config.window_height = height;
        }
        if let Some(title) = ini.get("window", "title") {
            config.title = title;
        }

        let (mut r, mut g, mut b) = config.clear_color;
        if let Some(value) = channel(ini, "clear_r")? {
            r = value;
        }
        if let Some(value) = channel(ini, "clear_g")? {
            g = value;
        }
        if let Some(value) = channel(ini, "clear_b")? {
            b = value;
        }
        config.clear_color = (r, g, b);

        if let Some(rate) = uint(ini, "render", "frame_rate")? {
            config.frame_rate = rate;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(Error::Config(format!(
                "window size {}x{} must not be empty",
                self.window_width, self.window_height
            )));
        }
        if self.frame_rate == 0 {
            return Err(Error::Config("frame_rate must be positive".to_string()));
        }
        Ok(())
    }

    pub fn frame_time(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.frame_rate.max(1) as u64)
    }
}

fn uint(ini: &Ini, section: &str, key: &str) -> Result<Option<u32>> {
    let value = ini
        .getuint(section, key)
        .map_err(|e| Error::Config(format!("[{}] {}: {}", section, key, e)))?;
    value
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| Error::Config(format!("[{}] {} = {} is too large", section, key, v)))
        })
        .transpose()
}

fn channel(ini: &Ini, key: &str) -> Result<Option<u8>> {
    uint(ini, "render", key)?
        .map(|v| {
            u8::try_from(v)
                .map_err(|_| Error::Config(format!("[render] {} = {} is not a color channel", key, v)))
        })
        .transpose()
}
