//! Preview images derived from captured pages.

pub mod filter;
pub mod generator;

pub use filter::ThumbnailFilter;
pub use generator::{PreviewGenerator, PreviewSize};
