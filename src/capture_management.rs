//! Capture orchestration.
//!
//! A capture runs as one background task moving through
//! [`CaptureState`]: the device program is run, the bytes are persisted under
//! a timestamp name, a numbered link makes the page visible and finally a
//! preview is derived.
//!
//! Example (non-running):
//! ```ignore
//! use std::sync::Arc;
//! use pagecap::capture_management::{CaptureOrchestrator, CaptureRequest};
//!
//! let orchestrator = CaptureOrchestrator::new(config, scanner, previews);
//! let handle = orchestrator.start_capture("alice", request)?;
//! let report = handle.wait().await?;
//! println!("{} -> {:?}", report.job, report.link_filename);
//! ```

pub mod orchestrator;
pub mod state;

pub use orchestrator::{CaptureHandle, CaptureOrchestrator, CaptureRequest};
pub use state::{CaptureReport, CaptureRun, CaptureState, Transition};
