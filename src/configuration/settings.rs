//! User-selected scan settings, persisted as JSON in the work directory.
//!
//! Mode and format are stored as the strings the user picked; they are only
//! interpreted when converted to scan parameters, where unknown values fall
//! back to defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::data_capture::types::{OutputFormat, ScanMode, ScanParams};
use crate::error_handling::types::ConfigError;
use crate::storage::artifacts;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_RESOLUTION: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_resolution", deserialize_with = "lenient_resolution")]
    pub resolution: u32,
}

fn default_mode() -> String {
    "Color".to_string()
}

fn default_format() -> String {
    "tiff".to_string()
}

fn default_resolution() -> u32 {
    DEFAULT_RESOLUTION
}

/// Accepts `300` as well as `"300"`; anything else means the default.
fn lenient_resolution<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(parsed.filter(|dpi| *dpi > 0).unwrap_or(DEFAULT_RESOLUTION))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            format: default_format(),
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl Settings {
    pub fn path(work_dir: &Path) -> PathBuf {
        work_dir.join(SETTINGS_FILE)
    }

    /// Loads the settings, writing the defaults when no file exists yet.
    ///
    /// An unreadable or malformed file yields the defaults and is left
    /// untouched on disk.
    pub fn load_or_init(work_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(work_dir);
        match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Settings>(&bytes) {
                Ok(settings) => Ok(settings),
                Err(e) => {
                    warn!("Ignoring malformed {}: {}", path.display(), e);
                    Ok(Settings::default())
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let settings = Settings::default();
                settings.save(work_dir)?;
                info!("Initialised {} with defaults", path.display());
                Ok(settings)
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    pub fn save(&self, work_dir: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| ConfigError::SettingsError(e.to_string()))?;
        artifacts::write_replace(&Self::path(work_dir), &json)?;
        Ok(())
    }

    pub fn scan_mode(&self) -> ScanMode {
        ScanMode::parse_lenient(&self.mode)
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::parse_lenient(&self.format)
    }

    /// Parameters for the device; a PDF output is captured as JPEG.
    pub fn scan_params(&self) -> ScanParams {
        ScanParams {
            mode: self.scan_mode(),
            format: self.output_format().device_format(),
            resolution: self.resolution,
        }
    }
}
