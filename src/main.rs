use clap::{Parser, Subcommand};
use imgboard::config::{self, AppConfig};
use imgboard::imaging::RustBackend;
use imgboard::index::VariantIndex;
use imgboard::ingest::{IngestionOrchestrator, Outcome, ThreadSubmission, Upload};
use imgboard::output;
use imgboard::processor::ImageProcessor;
use imgboard::threads::MemoryThreadRepository;
use imgboard::upload_state::{UploadStateStore, run_sweeper};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "imgboard")]
#[command(about = "Image ingestion for an image board")]
#[command(long_about = "\
Image ingestion for an image board

Uploaded images are stored as an original plus resized variants. Identity and
width live in the filename, so the storage directories alone are enough to
rebuild the index:

  data/img/
  ├── original/
  │   └── {uuid}_original.jpeg     # As uploaded, re-encoded
  ├── variant/
  │   ├── {uuid}_600.jpeg          # One per configured width
  │   └── {uuid}_1600.jpeg
  └── tmp/                         # Spooled uploads, removed after processing

Run 'imgboard gen-config' to generate a documented imgboard.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = "imgboard.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the image index from the storage directories and report
    Recover,
    /// Store images and open one thread per image
    Ingest {
        /// Image files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Thread subject
        #[arg(long, default_value = "")]
        subject: String,
        /// Opening post text
        #[arg(long, default_value = "")]
        body: String,
        /// Board the threads belong to
        #[arg(long)]
        board: Option<i64>,
    },
    /// Resolve `{uuid}_{width}` or `{uuid}` to a stored file
    Lookup {
        reference: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print a stock imgboard.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Recover => {
            let config = config::load_config(&cli.config)?;
            let index = VariantIndex::new();
            let report = index.recover(&config.storage, &RustBackend::new())?;
            output::print_recovery_report(&report, &config.storage);
        }
        Command::Ingest {
            files,
            subject,
            body,
            board,
        } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let submission = ThreadSubmission {
                subject,
                body,
                board_id: board,
            };
            ingest(&config, &files, submission).await?;
        }
        Command::Lookup { reference, json } => {
            let config = config::load_config(&cli.config)?;
            let index = VariantIndex::new();
            index.recover(&config.storage, &RustBackend::new())?;
            let served = index.resolve(&reference)?;
            if json {
                let value = serde_json::json!({
                    "image": &served,
                    "content_type": served.content_type(),
                    "cache_control": served.cache_control(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let metadata = index.get(&served.id);
                output::print_lines(&output::format_served(&served, metadata.as_ref()));
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Upload every file under a fresh token, wait for variants, and report.
async fn ingest(
    config: &AppConfig,
    files: &[PathBuf],
    submission: ThreadSubmission,
) -> Result<(), Box<dyn std::error::Error>> {
    config.storage.ensure_dirs()?;
    let index = Arc::new(VariantIndex::new());
    index.recover(&config.storage, &RustBackend::new())?;

    let processor = Arc::new(ImageProcessor::from_config(config, index.clone()));
    let uploads = Arc::new(UploadStateStore::new());
    let threads = Arc::new(MemoryThreadRepository::new());
    let cancel = CancellationToken::new();

    let sweeper = tokio::spawn(run_sweeper(
        uploads.clone(),
        config.uploads.sweep_interval(),
        config.uploads.token_ttl(),
        cancel.clone(),
    ));
    let orchestrator = IngestionOrchestrator::start(
        config,
        processor,
        uploads.clone(),
        threads,
        cancel.clone(),
    );

    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let token = uploads.new_token();
        let result = match open_upload(path).await {
            Ok(upload) => orchestrator
                .create(&token, Some(upload), submission.clone())
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        results.push((path, token, result));
    }

    orchestrator.shutdown().await;
    cancel.cancel();
    sweeper.await?;

    let mut rejected = 0;
    for (i, (path, token, result)) in results.iter().enumerate() {
        let name = display_name(path);
        let lines = match result {
            Ok(outcome) => {
                let metadata = match outcome {
                    Outcome::Created { image_id, .. } => index.get(image_id),
                    Outcome::Existing { .. } => None,
                };
                output::format_ingest(
                    i + 1,
                    &name,
                    outcome,
                    uploads.get(token).as_ref(),
                    metadata.as_ref(),
                )
            }
            Err(e) => {
                rejected += 1;
                output::format_ingest_error(i + 1, &name, e)
            }
        };
        output::print_lines(&lines);
    }
    info!(files = files.len(), rejected, "ingest finished");

    if rejected > 0 {
        return Err(format!("{} of {} files rejected", rejected, files.len()).into());
    }
    Ok(())
}

async fn open_upload(path: &Path) -> std::io::Result<Upload<tokio::fs::File>> {
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    Ok(Upload {
        file_name: display_name(path),
        declared_size: Some(size),
        reader: file,
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Structured logs go to stderr so command output on stdout stays clean.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
