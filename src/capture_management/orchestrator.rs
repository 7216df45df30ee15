use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::capture_management::state::{CaptureReport, CaptureRun, CaptureState};
use crate::configuration::config::Config;
use crate::configuration::settings::Settings;
use crate::data_capture::pdf;
use crate::data_capture::scanner::Scanner;
use crate::data_capture::types::{OutputFormat, ScanMode, ScanParams};
use crate::error_handling::types::{InventoryError, PipelineError};
use crate::storage::types::PageFormat;
use crate::storage::{artifacts, inventory, naming};
use crate::thumbnail::generator::PreviewGenerator;

/// What to capture, as chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub mode: ScanMode,
    pub output: OutputFormat,
    pub resolution: u32,
}

impl CaptureRequest {
    pub fn scan_params(&self) -> ScanParams {
        ScanParams {
            mode: self.mode,
            format: self.output.device_format(),
            resolution: self.resolution,
        }
    }
}

impl From<&Settings> for CaptureRequest {
    fn from(settings: &Settings) -> Self {
        Self {
            mode: settings.scan_mode(),
            output: settings.output_format(),
            resolution: settings.resolution,
        }
    }
}

/// Handle on a capture running in the background.
///
/// Dropping it does not cancel the capture.
#[derive(Debug)]
pub struct CaptureHandle {
    pub run_id: Uuid,
    pub job: String,
    task: JoinHandle<CaptureReport>,
}

impl CaptureHandle {
    pub async fn wait(self) -> Result<CaptureReport, PipelineError> {
        self.task
            .await
            .map_err(|e| PipelineError::TaskJoin(e.to_string()))
    }
}

type JobLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Runs captures end to end: device, content file, link, preview.
///
/// Captures into the same job are serialized from the moment the next page
/// number is computed until the link exists. Different jobs run in parallel.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    config: Arc<Config>,
    scanner: Arc<dyn Scanner>,
    previews: Arc<PreviewGenerator>,
    job_locks: JobLocks,
}

impl CaptureOrchestrator {
    pub fn new(
        config: Arc<Config>,
        scanner: Arc<dyn Scanner>,
        previews: Arc<PreviewGenerator>,
    ) -> Self {
        Self {
            config,
            scanner,
            previews,
            job_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Identity of the attached device, if any.
    pub async fn device(&self) -> Option<String> {
        self.scanner.device().await
    }

    /// Starts a capture into `job` and returns without waiting for it.
    ///
    /// The job directory is created first; an invalid job name or an
    /// unwritable output root is reported here, everything later ends up in
    /// the [`CaptureReport`].
    pub fn start_capture(
        &self,
        job: &str,
        request: CaptureRequest,
    ) -> Result<CaptureHandle, InventoryError> {
        let job_dir = inventory::create_job(&self.config.output_dir, job)?;
        let run = CaptureRun::new(job);
        let run_id = run.run_id;
        info!(
            "[{}] Capture requested for job {} ({} {} {}dpi)",
            run_id, job, request.mode, request.output, request.resolution
        );

        let orchestrator = self.clone();
        let task = tokio::spawn(async move { orchestrator.run(run, job_dir, request).await });

        Ok(CaptureHandle {
            run_id,
            job: job.to_string(),
            task,
        })
    }

    pub fn start_capture_with_settings(
        &self,
        job: &str,
        settings: &Settings,
    ) -> Result<CaptureHandle, InventoryError> {
        self.start_capture(job, CaptureRequest::from(settings))
    }

    async fn run(self, mut run: CaptureRun, job_dir: PathBuf, request: CaptureRequest) -> CaptureReport {
        let lock = self.job_lock(&run.job);
        let linked = {
            let _guard = lock.lock().await;
            self.capture_and_link(&mut run, &job_dir, request).await
        };
        self.release_job_lock(&run.job, lock);

        let source = match linked {
            Ok(source) => source,
            Err(e) => {
                run.fail(e);
                return run.into_report();
            }
        };

        if let Err(e) = run.advance(CaptureState::Previewing) {
            run.fail(e);
            return run.into_report();
        }
        if let Err(e) = self.generate_preview(&job_dir, source).await {
            run.record_preview_error(e);
        }
        if let Err(e) = run.advance(CaptureState::Done) {
            run.fail(e);
        }
        run.into_report()
    }

    /// Stages up to and including linking. The caller holds the job lock.
    ///
    /// Returns what the preview is derived from.
    async fn capture_and_link(
        &self,
        run: &mut CaptureRun,
        job_dir: &Path,
        request: CaptureRequest,
    ) -> Result<ResolvedSource, PipelineError> {
        let page_format = request.output.page_format();

        run.advance(CaptureState::Capturing)?;
        let index = {
            let dir = job_dir.to_path_buf();
            offload(move || naming::next_link_index(&dir)).await?
        };
        let link_filename = naming::link_filename(index, page_format);
        debug!("[{}] Next page of {} is {}", run.run_id, run.job, link_filename);
        run.link_filename = Some(link_filename.clone());
        let captured = self.scanner.capture(&request.scan_params()).await?;

        run.advance(CaptureState::Persisting)?;
        let (content_filename, source) = {
            let dir = job_dir.to_path_buf();
            offload(move || {
                let (payload, source) = match request.output {
                    OutputFormat::Pdf => {
                        let wrapped = pdf::jpeg_to_pdf(&captured)?;
                        (wrapped, PreviewSource::Jpeg(captured))
                    }
                    OutputFormat::Raw(_) => (captured, PreviewSource::ContentFile),
                };
                let name = artifacts::write_content(&dir, page_format, &payload)?;
                Ok::<_, PipelineError>((name, source))
            })
            .await?
        };
        run.content_filename = Some(content_filename.clone());

        run.advance(CaptureState::Linking)?;
        {
            let dir = job_dir.to_path_buf();
            let link = link_filename.clone();
            let content = content_filename.clone();
            offload(move || artifacts::create_link(&dir, &link, &content)).await?;
        }
        info!(
            "[{}] {} stored as {} -> {}",
            run.run_id, run.job, link_filename, content_filename
        );

        Ok(source.resolve(job_dir.join(content_filename)))
    }

    async fn generate_preview(&self, job_dir: &Path, source: ResolvedSource) -> Result<(), PipelineError> {
        let previews = Arc::clone(&self.previews);
        debug!("Generating preview in {}", job_dir.display());
        offload(move || match source {
            ResolvedSource::File(content_path) => previews.generate(&content_path).map(|_| ()),
            ResolvedSource::Bytes { jpeg, content_path } => previews
                .generate_from_bytes(&jpeg, PageFormat::Jpeg, &content_path)
                .map(|_| ()),
        })
        .await
    }

    fn job_lock(&self, job: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .job_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(job.to_string()).or_default())
    }

    /// Forgets the job's lock once no other capture holds or awaits it.
    fn release_job_lock(&self, job: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .job_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // one reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(job);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_jobs(&self) -> usize {
        self.job_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Bytes a preview can be made from, before the content path is known.
enum PreviewSource {
    ContentFile,
    Jpeg(Vec<u8>),
}

enum ResolvedSource {
    File(PathBuf),
    Bytes { jpeg: Vec<u8>, content_path: PathBuf },
}

impl PreviewSource {
    fn resolve(self, content_path: PathBuf) -> ResolvedSource {
        match self {
            PreviewSource::ContentFile => ResolvedSource::File(content_path),
            PreviewSource::Jpeg(jpeg) => ResolvedSource::Bytes { jpeg, content_path },
        }
    }
}

/// Runs blocking file or image work off the async workers.
async fn offload<T, E, F>(work: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<PipelineError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(PipelineError::TaskJoin(e.to_string())),
    }
}
