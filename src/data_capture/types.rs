//! Scan parameters handed to the capture program.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::storage::types::PageFormat;

/// Colour mode requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScanMode {
    Lineart,
    Gray,
    #[default]
    Color,
}

impl ScanMode {
    /// Case-insensitive parse. Unknown values fall back to `Color`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "lineart" => ScanMode::Lineart,
            "gray" | "grey" => ScanMode::Gray,
            "color" | "colour" => ScanMode::Color,
            other => {
                debug!("Unknown scan mode {:?}, using Color", other);
                ScanMode::Color
            }
        }
    }

    pub fn as_arg(self) -> &'static str {
        match self {
            ScanMode::Lineart => "Lineart",
            ScanMode::Gray => "Gray",
            ScanMode::Color => "Color",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Raw formats the device can emit directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanFormat {
    Tiff,
    Png,
    Jpeg,
    Pnm,
}

impl ScanFormat {
    pub fn as_arg(self) -> &'static str {
        PageFormat::from(self).extension()
    }
}

impl fmt::Display for ScanFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Format of the stored page. `Pdf` is derived from a JPEG capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Raw(ScanFormat),
    Pdf,
}

impl OutputFormat {
    /// Case-insensitive parse. Unknown values fall back to JPEG.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "tiff" | "tif" => OutputFormat::Raw(ScanFormat::Tiff),
            "png" => OutputFormat::Raw(ScanFormat::Png),
            "jpeg" | "jpg" => OutputFormat::Raw(ScanFormat::Jpeg),
            "pnm" => OutputFormat::Raw(ScanFormat::Pnm),
            "pdf" => OutputFormat::Pdf,
            other => {
                debug!("Unknown scan format {:?}, using jpeg", other);
                OutputFormat::Raw(ScanFormat::Jpeg)
            }
        }
    }

    /// Format the device is asked for.
    pub fn device_format(self) -> ScanFormat {
        match self {
            OutputFormat::Raw(format) => format,
            OutputFormat::Pdf => ScanFormat::Jpeg,
        }
    }

    /// Format of the content file that ends up on disk.
    pub fn page_format(self) -> PageFormat {
        match self {
            OutputFormat::Raw(format) => format.into(),
            OutputFormat::Pdf => PageFormat::Pdf,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Raw(ScanFormat::Tiff)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.page_format().extension())
    }
}

/// Arguments for one invocation of the capture program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub mode: ScanMode,
    pub format: ScanFormat,
    /// Resolution in dpi.
    pub resolution: u32,
}
