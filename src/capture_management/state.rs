use std::fmt;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error_handling::types::PipelineError;

/// Stage of a capture run.
///
/// Variants:
/// - `Idle`: accepted, not started.
/// - `Capturing`: the device program is running.
/// - `Persisting`: the page bytes are being written.
/// - `Linking`: the page is being made visible under its short name.
/// - `Previewing`: the preview is being derived.
/// - `Done`: the page is stored and linked.
/// - `Failed`: the run stopped before the page became visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureState {
    Idle,
    Capturing,
    Persisting,
    Linking,
    Previewing,
    Done,
    Failed,
}

impl CaptureState {
    pub fn can_advance_to(self, next: CaptureState) -> bool {
        use CaptureState::*;
        matches!(
            (self, next),
            (Idle, Capturing)
                | (Capturing, Persisting)
                | (Persisting, Linking)
                | (Linking, Previewing)
                | (Previewing, Done)
                | (Capturing, Failed)
                | (Persisting, Failed)
                | (Linking, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CaptureState::Done | CaptureState::Failed)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Capturing => "capturing",
            CaptureState::Persisting => "persisting",
            CaptureState::Linking => "linking",
            CaptureState::Previewing => "previewing",
            CaptureState::Done => "done",
            CaptureState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One state change and when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub state: CaptureState,
    pub at: DateTime<Utc>,
}

/// Mutable record of one run, owned by the task executing it.
#[derive(Debug)]
pub struct CaptureRun {
    pub run_id: Uuid,
    pub job: String,
    state: CaptureState,
    transitions: Vec<Transition>,
    pub link_filename: Option<String>,
    pub content_filename: Option<String>,
    failed_stage: Option<CaptureState>,
    error: Option<String>,
    preview_error: Option<String>,
}

impl CaptureRun {
    pub fn new(job: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job: job.to_string(),
            state: CaptureState::Idle,
            transitions: vec![Transition {
                state: CaptureState::Idle,
                at: Utc::now(),
            }],
            link_filename: None,
            content_filename: None,
            failed_stage: None,
            error: None,
            preview_error: None,
        }
    }

    pub fn advance(&mut self, next: CaptureState) -> Result<(), PipelineError> {
        if !self.state.can_advance_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        info!("[{}] {}: {} -> {}", self.run_id, self.job, self.state, next);
        self.state = next;
        self.record(next);
        Ok(())
    }

    /// Ends the run in `Failed`, remembering the stage that broke.
    pub fn fail(&mut self, err: PipelineError) {
        error!(
            "[{}] {}: capture failed while {}: {}",
            self.run_id, self.job, self.state, err
        );
        if !self.state.can_advance_to(CaptureState::Failed) {
            warn!("[{}] forcing failure from state {}", self.run_id, self.state);
        }
        self.failed_stage = Some(self.state);
        self.error = Some(err.to_string());
        self.state = CaptureState::Failed;
        self.record(CaptureState::Failed);
    }

    fn record(&mut self, state: CaptureState) {
        self.transitions.push(Transition {
            state,
            at: Utc::now(),
        });
    }

    /// A preview problem does not fail the run; it is only reported.
    pub fn record_preview_error(&mut self, err: PipelineError) {
        warn!("[{}] {}: preview not generated: {}", self.run_id, self.job, err);
        self.preview_error = Some(err.to_string());
    }

    pub fn into_report(self) -> CaptureReport {
        CaptureReport {
            run_id: self.run_id,
            job: self.job,
            state: self.state,
            link_filename: self.link_filename,
            content_filename: self.content_filename,
            failed_stage: self.failed_stage,
            error: self.error,
            preview_error: self.preview_error,
            transitions: self.transitions,
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureReport {
    pub run_id: Uuid,
    pub job: String,
    pub state: CaptureState,
    pub link_filename: Option<String>,
    pub content_filename: Option<String>,
    pub failed_stage: Option<CaptureState>,
    pub error: Option<String>,
    pub preview_error: Option<String>,
    pub transitions: Vec<Transition>,
}

impl CaptureReport {
    pub fn is_done(&self) -> bool {
        self.state == CaptureState::Done
    }

    /// States visited, in order.
    pub fn states(&self) -> Vec<CaptureState> {
        self.transitions.iter().map(|t| t.state).collect()
    }
}
