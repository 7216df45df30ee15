use std::fmt;
use std::path::PathBuf;

use crate::capture_management::state::CaptureState;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    SettingsError(String),
    MissingValue(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::SettingsError(e) => write!(f, "Settings file error: {}", e),
            ConfigError::MissingValue(e) => write!(f, "Missing configuration value: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures while reading or resolving the on-disk job layout.
#[derive(Debug)]
pub enum InventoryError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidName(String),
    JobNotFound(String),
    JobExists(String),
    NotALink(PathBuf),
    DanglingLink(PathBuf),
}

impl InventoryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InventoryError::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryError::Io { path, source } => {
                write!(f, "Cannot access {}: {}", path.display(), source)
            }
            InventoryError::InvalidName(name) => write!(f, "Invalid name: {:?}", name),
            InventoryError::JobNotFound(name) => write!(f, "Job not found: {}", name),
            InventoryError::JobExists(name) => write!(f, "Job already exists: {}", name),
            InventoryError::NotALink(path) => write!(f, "Not a symbolic link: {}", path.display()),
            InventoryError::DanglingLink(path) => {
                write!(f, "Link target does not exist: {}", path.display())
            }
        }
    }
}

impl std::error::Error for InventoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InventoryError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failures of the external capture program.
#[derive(Debug)]
pub enum CaptureError {
    Launch(std::io::Error),
    ProcessFailed { status: Option<i32>, output: String },
    EmptyOutput,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Launch(e) => write!(f, "Unable to launch capture program: {}", e),
            CaptureError::ProcessFailed { status, output } => match status {
                Some(code) => write!(f, "Capture program exited with status {}: {}", code, output),
                None => write!(f, "Capture program terminated by signal: {}", output),
            },
            CaptureError::EmptyOutput => write!(f, "Capture program produced no image data"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Failures while writing, linking or removing artifacts.
#[derive(Debug)]
pub enum PersistError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Pdf(String),
    NameExhausted(PathBuf),
    Inventory(InventoryError),
}

impl PersistError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io { path, source } => {
                write!(f, "Cannot write {}: {}", path.display(), source)
            }
            PersistError::Pdf(e) => write!(f, "PDF conversion failed: {}", e),
            PersistError::NameExhausted(dir) => {
                write!(f, "No free content filename in {}", dir.display())
            }
            PersistError::Inventory(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<InventoryError> for PersistError {
    fn from(err: InventoryError) -> Self {
        PersistError::Inventory(err)
    }
}

/// Failures of preview generation or lookup.
#[derive(Debug)]
pub enum PreviewError {
    NotFound(PathBuf),
    UnsupportedFormat(String),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    Encode(image::ImageError),
}

impl fmt::Display for PreviewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewError::NotFound(path) => write!(f, "Preview not found: {}", path.display()),
            PreviewError::UnsupportedFormat(ext) => {
                write!(f, "Image format not supported: {:?}", ext)
            }
            PreviewError::Io { path, source } => {
                write!(f, "Cannot access {}: {}", path.display(), source)
            }
            PreviewError::Decode { path, source } => {
                write!(f, "Cannot decode image {}: {}", path.display(), source)
            }
            PreviewError::Encode(e) => write!(f, "Cannot encode preview: {}", e),
        }
    }
}

impl std::error::Error for PreviewError {}

/// Error that stopped (or degraded) a capture run.
#[derive(Debug)]
pub enum PipelineError {
    Inventory(InventoryError),
    Capture(CaptureError),
    Persist(PersistError),
    Preview(PreviewError),
    IllegalTransition { from: CaptureState, to: CaptureState },
    TaskJoin(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Inventory(e) => write!(f, "Inventory error: {}", e),
            PipelineError::Capture(e) => write!(f, "Capture error: {}", e),
            PipelineError::Persist(e) => write!(f, "Persist error: {}", e),
            PipelineError::Preview(e) => write!(f, "Preview error: {}", e),
            PipelineError::IllegalTransition { from, to } => {
                write!(f, "Illegal capture transition {} -> {}", from, to)
            }
            PipelineError::TaskJoin(e) => write!(f, "Background task failed: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<InventoryError> for PipelineError {
    fn from(err: InventoryError) -> Self {
        PipelineError::Inventory(err)
    }
}

impl From<CaptureError> for PipelineError {
    fn from(err: CaptureError) -> Self {
        PipelineError::Capture(err)
    }
}

impl From<PersistError> for PipelineError {
    fn from(err: PersistError) -> Self {
        PipelineError::Persist(err)
    }
}

impl From<PreviewError> for PipelineError {
    fn from(err: PreviewError) -> Self {
        PipelineError::Preview(err)
    }
}
