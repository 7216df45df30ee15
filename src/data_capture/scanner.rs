use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::process::Command;

use crate::configuration::config::Config;
use crate::data_capture::types::ScanParams;
use crate::error_handling::types::CaptureError;

pub const DEFAULT_SCANNER_PROGRAM: &str = "/usr/bin/scanimage";

/// Source of raw page images.
///
/// The production implementation is [`ScanImage`]; tests substitute their own.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Runs one capture and returns the encoded image bytes.
    async fn capture(&self, params: &ScanParams) -> Result<Vec<u8>, CaptureError>;

    /// Identity string of the attached device, `None` when nothing answers.
    async fn device(&self) -> Option<String>;
}

/// Drives a SANE `scanimage` compatible program.
///
/// Arguments are passed as a vector, never through a shell. The process has
/// no timeout: a hung device keeps the calling task waiting.
#[derive(Debug, Clone)]
pub struct ScanImage {
    program: PathBuf,
    /// Arguments placed before the scan arguments, e.g. when the program is
    /// a wrapper such as `sudo -u saned /usr/bin/scanimage`.
    leading_args: Vec<String>,
}

impl ScanImage {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.scanner_program).with_leading_args(config.scanner_args.clone())
    }

    pub fn capture_args(params: &ScanParams) -> Vec<String> {
        vec![
            format!("--mode={}", params.mode.as_arg()),
            format!("--resolution={}", params.resolution),
            format!("--format={}", params.format.as_arg()),
        ]
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for ScanImage {
    fn default() -> Self {
        Self::new(DEFAULT_SCANNER_PROGRAM)
    }
}

#[async_trait]
impl Scanner for ScanImage {
    async fn capture(&self, params: &ScanParams) -> Result<Vec<u8>, CaptureError> {
        let args = Self::capture_args(params);
        info!("Running {} {}", self.program.display(), args.join(" "));

        let output = self.command(&args).output().await.map_err(|e| {
            error!("Failed to launch {}: {}", self.program.display(), e);
            CaptureError::Launch(e)
        })?;

        if !output.status.success() {
            let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                "{} failed ({}): {}",
                self.program.display(),
                output.status,
                message
            );
            return Err(CaptureError::ProcessFailed {
                status: output.status.code(),
                output: message,
            });
        }
        if output.stdout.is_empty() {
            warn!("{} returned no data", self.program.display());
            return Err(CaptureError::EmptyOutput);
        }

        debug!(
            "Captured {} byte(s) from {}",
            output.stdout.len(),
            self.program.display()
        );
        Ok(output.stdout)
    }

    async fn device(&self) -> Option<String> {
        let args = vec!["--formatted-device-list=%m".to_string()];
        let output = match self.command(&args).output().await {
            Ok(output) => output,
            Err(e) => {
                warn!("Cannot query device through {}: {}", self.program.display(), e);
                return None;
            }
        };
        if !output.status.success() {
            warn!(
                "Device query failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() {
            info!("No scanning device available");
            None
        } else {
            debug!("Device: {}", name);
            Some(name)
        }
    }
}
