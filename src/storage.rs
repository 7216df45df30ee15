//! Storage subsystem
//!
//! Everything that touches the on-disk job layout.
//!
//! Components:
//! - `naming`: content, link and preview filenames; next page number.
//! - `inventory`: read-only listing of jobs and pages, plus job management.
//! - `artifacts`: atomic writes, link creation and page removal.
//! - `types`: records returned by the inventory.

pub mod artifacts;
pub mod inventory;
pub mod naming;
pub mod types;

pub use types::{ImageEntry, JobEntry, PageFormat};
