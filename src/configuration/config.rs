use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::data_capture::scanner::DEFAULT_SCANNER_PROGRAM;
use crate::error_handling::types::ConfigError;
use crate::thumbnail::generator::{DETAIL_PREVIEW_HEIGHT, LIST_PREVIEW_HEIGHT};

const MAX_PREVIEW_HEIGHT: u32 = 10_000;

/// Runtime configuration, immutable once the process has started.
///
/// Values come from a TOML file, from the command line, or from `PAGECAP_*`
/// environment variables. Command-line and environment values override the
/// file.
///
/// ```toml
/// output_dir = "/srv/scans/output"
/// work_dir = "/srv/scans/work"
/// scanner_program = "/usr/bin/scanimage"
/// thumbnail_filter = "Lanczos"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root under which every job directory lives.
    pub output_dir: PathBuf,

    /// Holds `settings.json`.
    pub work_dir: PathBuf,

    #[serde(default = "default_scanner_program")]
    pub scanner_program: PathBuf,

    /// Passed to `scanner_program` before the scan arguments.
    #[serde(default)]
    pub scanner_args: Vec<String>,

    #[serde(default = "default_thumbnail_filter")]
    pub thumbnail_filter: String,

    #[serde(default = "default_list_preview_height")]
    pub list_preview_height: u32,

    #[serde(default = "default_detail_preview_height")]
    pub detail_preview_height: u32,

    #[serde(default)]
    pub debug: bool,
}

fn default_scanner_program() -> PathBuf {
    PathBuf::from(DEFAULT_SCANNER_PROGRAM)
}

fn default_thumbnail_filter() -> String {
    "NearestNeighbor".to_string()
}

fn default_list_preview_height() -> u32 {
    LIST_PREVIEW_HEIGHT
}

fn default_detail_preview_height() -> u32 {
    DETAIL_PREVIEW_HEIGHT
}

/// Command-line overrides. Every field is optional so a configuration file
/// can supply the rest.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Root directory holding the jobs
    #[arg(long, env = "PAGECAP_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory holding settings.json
    #[arg(long, env = "PAGECAP_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// scanimage compatible program
    #[arg(long, env = "PAGECAP_SCANNER")]
    pub scanner_program: Option<PathBuf>,

    /// Extra argument placed before the scan arguments (repeatable)
    #[arg(long = "scanner-arg", allow_hyphen_values = true)]
    pub scanner_args: Vec<String>,

    /// Resampling filter used for previews
    #[arg(long, env = "PAGECAP_THUMBNAIL_FILTER")]
    pub thumbnail_filter: Option<String>,

    #[arg(long, env = "PAGECAP_LIST_PREVIEW_HEIGHT")]
    pub list_preview_height: Option<u32>,

    #[arg(long, env = "PAGECAP_DETAIL_PREVIEW_HEIGHT")]
    pub detail_preview_height: Option<u32>,

    /// Verbose logging
    #[arg(long, env = "PAGECAP_DEBUG")]
    pub debug: bool,

    /// Create missing output and work directories
    #[arg(long)]
    pub create_dirs: bool,
}

impl Config {
    pub fn new(output_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            work_dir: work_dir.into(),
            scanner_program: default_scanner_program(),
            scanner_args: Vec::new(),
            thumbnail_filter: default_thumbnail_filter(),
            list_preview_height: LIST_PREVIEW_HEIGHT,
            detail_preview_height: DETAIL_PREVIEW_HEIGHT,
            debug: false,
        }
    }

    /// Reads a TOML configuration file. Nothing is validated yet.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        debug!("Configuration read from {}", path.display());
        Ok(config)
    }

    /// Merges command-line values over an optional file configuration.
    pub fn resolve(file: Option<Config>, args: &ConfigArgs) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(config) => config,
            None => {
                let output_dir = args
                    .output_dir
                    .clone()
                    .ok_or_else(|| ConfigError::MissingValue("output_dir".to_string()))?;
                let work_dir = args
                    .work_dir
                    .clone()
                    .ok_or_else(|| ConfigError::MissingValue("work_dir".to_string()))?;
                Config::new(output_dir, work_dir)
            }
        };

        if let Some(dir) = &args.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &args.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(program) = &args.scanner_program {
            config.scanner_program = program.clone();
        }
        if !args.scanner_args.is_empty() {
            config.scanner_args = args.scanner_args.clone();
        }
        if let Some(filter) = &args.thumbnail_filter {
            config.thumbnail_filter = filter.clone();
        }
        if let Some(height) = args.list_preview_height {
            config.list_preview_height = height;
        }
        if let Some(height) = args.detail_preview_height {
            config.detail_preview_height = height;
        }
        config.debug |= args.debug;

        Ok(config)
    }

    /// Checks directories and numeric ranges.
    ///
    /// With `create_dirs` missing directories are created instead of
    /// rejected.
    pub fn validate(&self, create_dirs: bool) -> Result<(), ConfigError> {
        for (name, dir) in [("output_dir", &self.output_dir), ("work_dir", &self.work_dir)] {
            if dir.is_dir() {
                continue;
            }
            if create_dirs {
                fs::create_dir_all(dir)?;
                info!("Created {} {}", name, dir.display());
            } else {
                return Err(ConfigError::DirectoryDoesNotExist(format!(
                    "{} {}",
                    name,
                    dir.display()
                )));
            }
        }

        for (name, height) in [
            ("list_preview_height", self.list_preview_height),
            ("detail_preview_height", self.detail_preview_height),
        ] {
            if !(1..=MAX_PREVIEW_HEIGHT).contains(&height) {
                return Err(ConfigError::NotInRange(format!(
                    "{} must be within 1..={}, got {}",
                    name, MAX_PREVIEW_HEIGHT, height
                )));
            }
        }
        Ok(())
    }
}
