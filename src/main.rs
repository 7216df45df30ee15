use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use pagecap::capture_management::{CaptureOrchestrator, CaptureRequest, CaptureState};
use pagecap::configuration::config::{Config, ConfigArgs};
use pagecap::configuration::settings::Settings;
use pagecap::data_capture::types::{OutputFormat, ScanMode};
use pagecap::data_capture::ScanImage;
use pagecap::error_handling::types::InventoryError;
use pagecap::storage::{artifacts, inventory, naming};
use pagecap::thumbnail::{PreviewGenerator, PreviewSize};

#[derive(Parser)]
#[command(name = "pagecap")]
#[command(version)]
#[command(about = "Drive a scanner and keep captured pages organised in jobs")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PAGECAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List jobs, most recent first
    Jobs,
    /// List the pages of a job in capture order
    Images { job: String },
    /// Capture one page into a job
    Scan {
        job: String,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        resolution: Option<u32>,
    },
    /// Write the preview of a page, generating it when missing
    Preview {
        job: String,
        /// Page link, e.g. `1` or `1.tiff`
        link: String,
        /// Use the larger preview size
        #[arg(long)]
        detail: bool,
        /// Output file, stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a page with its preview
    Delete { job: String, link: String },
    RenameJob { from: String, to: String },
    DeleteJob { job: String },
    /// Show the attached device
    Device,
    /// Show or change the stored scan settings
    Settings {
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        resolution: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // the level depends on the file, so the logger starts after loading it
    let loaded = load_config(&cli);
    let debug = match &loaded {
        Ok(config) => config.debug,
        Err(_) => cli.overrides.debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level(debug))
        .format_target(false)
        .init();

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(path) = &cli.config {
        info!("Configuration imported from {}", path.display());
    }

    if let Err(e) = run(cli.command, config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn log_level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn Error>> {
    let file = match &cli.config {
        Some(path) => Some(Config::from_file(path)?),
        None => None,
    };
    let config = Config::resolve(file, &cli.overrides)?;
    config.validate(cli.overrides.create_dirs)?;
    Ok(config)
}

async fn run(command: Command, config: Config) -> Result<(), Box<dyn Error>> {
    let config = Arc::new(config);
    match command {
        Command::Jobs => {
            for job in inventory::list_jobs(&config.output_dir)? {
                println!("{}", job.name);
            }
        }
        Command::Images { job } => {
            let dir = existing_job(&config, &job)?;
            for image in inventory::list_images(&dir)? {
                println!(
                    "{}\t{}\t{}",
                    image.link_filename, image.content_filename, image.format
                );
            }
        }
        Command::Scan {
            job,
            mode,
            format,
            resolution,
        } => {
            let settings = Settings::load_or_init(&config.work_dir)?;
            let mut request = CaptureRequest::from(&settings);
            if let Some(mode) = mode {
                request.mode = ScanMode::parse_lenient(&mode);
            }
            if let Some(format) = format {
                request.output = OutputFormat::parse_lenient(&format);
            }
            if let Some(resolution) = resolution {
                request.resolution = resolution;
            }

            let orchestrator = orchestrator(&config);
            let report = orchestrator.start_capture(&job, request)?.wait().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.state == CaptureState::Failed {
                return Err(report
                    .error
                    .unwrap_or_else(|| "capture failed".to_string())
                    .into());
            }
        }
        Command::Preview {
            job,
            link,
            detail,
            out,
        } => {
            let dir = existing_job(&config, &job)?;
            let content = resolve_page(&dir, &link)?;
            let size = if detail {
                PreviewSize::Detail
            } else {
                PreviewSize::List
            };
            let jpeg = PreviewGenerator::from_config(&config, size).preview_or_generate(&content)?;
            match out {
                Some(path) => fs::write(&path, &jpeg)?,
                None => io::stdout().write_all(&jpeg)?,
            }
        }
        Command::Delete { job, link } => {
            let dir = existing_job(&config, &job)?;
            let link_filename = page_link_filename(&dir, &link)?;
            let removed = artifacts::delete_image(&dir, &link_filename)?;
            info!("Removed {}", removed.link.display());
        }
        Command::RenameJob { from, to } => {
            inventory::rename_job(&config.output_dir, &from, &to)?;
        }
        Command::DeleteJob { job } => {
            inventory::delete_job(&config.output_dir, &job)?;
        }
        Command::Device => match orchestrator(&config).device().await {
            Some(device) => println!("{}", device),
            None => println!("no device"),
        },
        Command::Settings {
            mode,
            format,
            resolution,
        } => {
            let mut settings = Settings::load_or_init(&config.work_dir)?;
            let changed = mode.is_some() || format.is_some() || resolution.is_some();
            if let Some(mode) = mode {
                settings.mode = mode;
            }
            if let Some(format) = format {
                settings.format = format;
            }
            if let Some(resolution) = resolution {
                settings.resolution = resolution;
            }
            if changed {
                settings.save(&config.work_dir)?;
                info!("Settings saved");
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}

fn orchestrator(config: &Arc<Config>) -> CaptureOrchestrator {
    CaptureOrchestrator::new(
        Arc::clone(config),
        Arc::new(ScanImage::from_config(config)),
        Arc::new(PreviewGenerator::from_config(config, PreviewSize::List)),
    )
}

fn existing_job(config: &Config, job: &str) -> Result<PathBuf, InventoryError> {
    let dir = inventory::job_dir(&config.output_dir, job)?;
    if !dir.is_dir() {
        return Err(InventoryError::JobNotFound(job.to_string()));
    }
    Ok(dir)
}

/// Accepts either the full link filename or its short name.
fn page_link_filename(job_dir: &Path, link: &str) -> Result<String, InventoryError> {
    if link.contains('.') {
        return Ok(link.to_string());
    }
    inventory::list_images(job_dir)?
        .into_iter()
        .find(|image| image.link_name == link)
        .map(|image| image.link_filename)
        .ok_or_else(|| InventoryError::InvalidName(link.to_string()))
}

fn resolve_page(job_dir: &Path, link: &str) -> Result<PathBuf, InventoryError> {
    let link_filename = page_link_filename(job_dir, link)?;
    naming::resolve_link(job_dir, &link_filename)
}
