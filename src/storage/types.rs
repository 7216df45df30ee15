//! Records returned by the directory inventory.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::data_capture::types::ScanFormat;

/// Format of a stored page, derived from its content filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    Tiff,
    Png,
    Jpeg,
    Pnm,
    Pdf,
}

impl PageFormat {
    pub const ALL: [PageFormat; 5] = [
        PageFormat::Tiff,
        PageFormat::Png,
        PageFormat::Jpeg,
        PageFormat::Pnm,
        PageFormat::Pdf,
    ];

    /// Extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            PageFormat::Tiff => "tiff",
            PageFormat::Png => "png",
            PageFormat::Jpeg => "jpeg",
            PageFormat::Pnm => "pnm",
            PageFormat::Pdf => "pdf",
        }
    }

    /// Strict lookup; only the extensions this crate writes are recognised.
    pub fn from_extension(ext: &str) -> Option<Self> {
        PageFormat::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

impl From<ScanFormat> for PageFormat {
    fn from(format: ScanFormat) -> Self {
        match format {
            ScanFormat::Tiff => PageFormat::Tiff,
            ScanFormat::Png => PageFormat::Png,
            ScanFormat::Jpeg => PageFormat::Jpeg,
            ScanFormat::Pnm => PageFormat::Pnm,
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A job directory under the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEntry {
    pub name: String,
    pub modified: SystemTime,
}

/// A captured page as seen through its stable link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Short identifier shown to users, e.g. `"3"`.
    pub link_name: String,
    /// Symlink file name, e.g. `"3.tiff"`.
    pub link_filename: String,
    /// Link target, e.g. `"20261019134501123.tiff"`.
    pub content_filename: String,
    pub format: PageFormat,
    /// Modification time of the link itself.
    pub modified: SystemTime,
}

impl ImageEntry {
    /// Numeric sequence position, when the link name is an integer.
    pub fn index(&self) -> Option<u32> {
        self.link_name.parse().ok()
    }
}
