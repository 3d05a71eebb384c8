use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tillroll_conditioning::{
    codec, content_key, output_path, spawn_intake_watcher, BatchOutcome, ContourRectangleDetector,
    ReceiptConditioner, TextRecognizer,
};
use tillroll_core::{ConditioningConfig, ProcessingType};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod report;

use report::{BatchReport, Report, SingleReport};

/// Reported on every `batch` run when no text recognizer is compiled in.
const NO_TEXT_RECOGNITION: &str =
    "built without the `tesseract` feature: no text is recognized, so parts are never stitched";

#[derive(Debug, Parser)]
#[command(name = "tillroll", version, about = "Condition receipt photos for OCR and storage")]
struct Cli {
    /// TOML config file. Defaults to `tillroll.toml` in the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where conditioned images are written.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Condition each file as an independent capture.
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// camera, document-scan, gallery-single, or any other label.
        #[arg(long, default_value = "camera")]
        kind: String,
        /// Also write a downscaled, OCR-tuned JPEG.
        #[arg(long)]
        transmit: bool,
    },
    /// Treat the files as one gallery selection, stitching when they look like
    /// parts of one receipt.
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Process every image dropped into a folder.
    Watch {
        /// Defaults to `intake/` in the platform data directory.
        dir: Option<PathBuf>,
        #[arg(long)]
        transmit: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let project_dirs = directories::ProjectDirs::from("com", "tillroll", "Tillroll");

    let config = load_config(cli.config.as_deref(), project_dirs.as_ref())?;
    let out_dir = match (cli.out, &project_dirs) {
        (Some(out), _) => out,
        (None, Some(dirs)) => dirs.data_dir().join("conditioned"),
        (None, None) => anyhow::bail!("No --out given and no platform data directory available"),
    };

    let conditioner = ReceiptConditioner::new(
        config,
        Arc::new(ContourRectangleDetector::default()),
        text_recognizer(),
    );

    match cli.command {
        Command::Process { files, kind, transmit } => {
            let kind = ProcessingType::from(kind);
            for file in files {
                let report = process_file(&conditioner, &file, kind.clone(), transmit, &out_dir).await?;
                print_report(&Report::Single(report))?;
            }
        }
        Command::Batch { files } => {
            let text_recognition = cfg!(feature = "tesseract");
            if !text_recognition {
                tracing::warn!("{NO_TEXT_RECOGNITION}");
            }
            let report = process_batch(&conditioner, files, &out_dir, text_recognition).await?;
            print_report(&report)?;
        }
        Command::Watch { dir, transmit } => {
            let intake_dir = match (dir, &project_dirs) {
                (Some(dir), _) => dir,
                (None, Some(dirs)) => dirs.data_dir().join("intake"),
                (None, None) => anyhow::bail!("No intake directory given and no platform data directory available"),
            };
            watch(&conditioner, &intake_dir, transmit, &out_dir).await?;
        }
    }

    Ok(())
}

fn load_config(explicit: Option<&Path>, dirs: Option<&directories::ProjectDirs>) -> Result<ConditioningConfig> {
    if let Some(path) = explicit {
        return ConditioningConfig::load(path).with_context(|| format!("Loading config {}", path.display()));
    }
    match dirs.map(|d| d.config_dir().join("tillroll.toml")) {
        Some(path) if path.exists() => {
            tracing::info!("Using config {}", path.display());
            ConditioningConfig::load(&path).with_context(|| format!("Loading config {}", path.display()))
        }
        _ => Ok(ConditioningConfig::default()),
    }
}

#[cfg(feature = "tesseract")]
fn text_recognizer() -> Arc<dyn TextRecognizer> {
    // TODO: expose the tessdata directory and language as CLI options.
    Arc::new(tillroll_conditioning::TesseractRecognizer::new(None, "eng"))
}

#[cfg(not(feature = "tesseract"))]
fn text_recognizer() -> Arc<dyn TextRecognizer> {
    Arc::new(tillroll_conditioning::MockTextRecognizer::default())
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Writing {}", path.display()))
}

async fn process_file(
    conditioner: &ReceiptConditioner,
    file: &Path,
    kind: ProcessingType,
    transmit: bool,
    out_dir: &Path,
) -> Result<SingleReport> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Reading {}", file.display()))?;
    let key = content_key(&bytes);

    let result = conditioner
        .process_single_bytes(&bytes, kind)
        .await
        .with_context(|| format!("Conditioning {}", file.display()))?;
    let output = output_path(out_dir, &key, "conditioned", "png");
    write_output(&output, &codec::encode_png(&result.image)?).await?;

    let transmission = if transmit {
        let path = output_path(out_dir, &key, "transmit", "jpg");
        write_output(&path, &conditioner.prepare_for_transmission_bytes(&bytes)?).await?;
        Some(path)
    } else {
        None
    };

    Ok(SingleReport::new(file.to_path_buf(), output, transmission, &result))
}

async fn process_batch(
    conditioner: &ReceiptConditioner,
    files: Vec<PathBuf>,
    out_dir: &Path,
    text_recognition: bool,
) -> Result<Report> {
    let mut images = Vec::with_capacity(files.len());
    let mut all_bytes = Vec::new();
    for file in &files {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Reading {}", file.display()))?;
        images.push(codec::decode(&bytes).with_context(|| format!("Decoding {}", file.display()))?);
        all_bytes.extend_from_slice(&bytes);
    }
    let key = content_key(&all_bytes);

    match conditioner.process_batch(images).await {
        BatchOutcome::Single(result) => {
            let output = output_path(out_dir, &key, "conditioned", "png");
            write_output(&output, &codec::encode_png(&result.image)?).await?;
            Ok(Report::Single(SingleReport::new(files[0].clone(), output, None, &result)))
        }
        BatchOutcome::MultiPart(result) => {
            let mut outputs = Vec::with_capacity(result.processed_images.len());
            for (i, image) in result.processed_images.iter().enumerate() {
                let variant = if result.is_stitched { "stitched".to_string() } else { format!("part{i}") };
                let output = output_path(out_dir, &key, &variant, "png");
                write_output(&output, &codec::encode_png(image)?).await?;
                outputs.push(output);
            }
            let report = BatchReport::new(files, outputs, &result);
            Ok(Report::Batch(if text_recognition {
                report
            } else {
                report.with_warning(NO_TEXT_RECOGNITION)
            }))
        }
    }
}

async fn watch(conditioner: &ReceiptConditioner, intake_dir: &Path, transmit: bool, out_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(intake_dir).await?;

    // The channel bridges the notify watcher thread and the async processor.
    let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
    // The watcher must be kept alive for the duration of the loop.
    let _watcher = spawn_intake_watcher(intake_dir, tx).context("Failed to start intake folder watcher")?;
    tracing::info!("Watching intake folder: {}", intake_dir.display());

    loop {
        tokio::select! {
            path = rx.recv() => {
                let Some(path) = path else { break };
                tracing::info!("Processing receipt: {}", path.display());
                match process_file(conditioner, &path, ProcessingType::Camera, transmit, out_dir).await {
                    Ok(report) => print_report(&Report::Single(report))?,
                    Err(e) => tracing::warn!("Receipt conditioning error: {e:#}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping watcher");
                break;
            }
        }
    }
    Ok(())
}

fn print_report(report: &Report) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
