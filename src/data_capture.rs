//! Acquisition of page images from the scanning device.
//!
//! Re-exports:
//! - [`Scanner`]: the seam between the pipeline and the device program.
//! - [`ScanImage`]: `scanimage` backed implementation.

pub mod pdf;
pub mod scanner;
pub mod types;

pub use scanner::{ScanImage, Scanner};
pub use types::{OutputFormat, ScanFormat, ScanMode, ScanParams};
