//! drawscan CLI
//!
//! Command-line front end for the ticket capture pipeline: replays photos
//! through preprocess -> OCR -> draw parsing and prints what it found.
//!
//! Copyright (c) 2025 Michael A Wright

mod console;
mod inputs;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use console::{format_report, ConsoleSurface};
use core_pipeline::pipeline::report_for;
use core_pipeline::preprocess::{preprocess, PreprocessConfig};
use core_pipeline::source::{acquire_from_file, SelectedFile};
use core_pipeline::{
    CaptureMode, CaptureOutcome, CharsetProfile, OcrBackend, PipelineConfig, RecognitionOptions,
    RecognitionResult, ResultSurface, ScanPipeline, ScanReport, TesseractBackend,
};
use inputs::PhotoFrame;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[allow(dead_code)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("BUILT_GIT_COMMIT_HASH"),
    "\nbuilt:  ",
    env!("BUILT_TIME_UTC"),
    "\ntessdata: ",
    env!("DRAWSCAN_TESSDATA_LABEL")
);

/// tessdata directory baked in at build time, if any
fn default_tessdata() -> Option<PathBuf> {
    let baked = env!("DRAWSCAN_TESSDATA");
    (!baked.is_empty()).then(|| PathBuf::from(baked))
}

#[derive(Parser)]
#[command(name = "drawscan")]
#[command(about = "Read lottery ticket numbers from photos", long_about = None)]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Photo already framed by the user: no crop
    Still,
    /// Treat the photo as a camera frame: crop to the targeting band
    Live,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Still => CaptureMode::Still,
            ModeArg::Live => CaptureMode::Live,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    /// Digits and space only
    Numeric,
    /// Digits, A-Z, brackets and dash
    Alnum,
}

impl From<ProfileArg> for CharsetProfile {
    fn from(profile: ProfileArg) -> Self {
        match profile {
            ProfileArg::Numeric => CharsetProfile::Numeric,
            ProfileArg::Alnum => CharsetProfile::AlphanumericBrackets,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a photo, or every photo in a directory
    Scan {
        /// Input file or directory
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value = "still")]
        mode: ModeArg,

        #[arg(short, long, value_enum, default_value = "alnum")]
        profile: ProfileArg,

        /// Assume a single uniform block of text
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        single_block: bool,

        /// Tesseract language code
        #[arg(long, default_value = "eng")]
        lang: String,

        /// Directory containing tessdata; defaults to the one baked in at build time
        #[arg(long)]
        tessdata: Option<PathBuf>,

        /// Print one JSON record per photo
        #[arg(long)]
        json: bool,
    },

    /// Write the image that would be sent to OCR
    Preprocess {
        #[arg(short, long)]
        input: PathBuf,

        /// Output JPEG file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value = "still")]
        mode: ModeArg,

        /// Print the image as a data URI instead of its fingerprint
        #[arg(long)]
        data_uri: bool,
    },

    /// Classify OCR text without an image
    Parse {
        /// Text file, or - for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        #[arg(long)]
        json: bool,
    },
}

/// JSON record printed per scanned photo
#[derive(Serialize)]
struct ScanRecord<'a> {
    file: String,
    mode: CaptureMode,
    scanned_at: DateTime<Utc>,
    #[serde(flatten)]
    report: &'a ScanReport,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(
        rustc = built_info::RUSTC_VERSION,
        target = built_info::TARGET,
        "drawscan {}",
        built_info::PKG_VERSION
    );

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            input,
            mode,
            profile,
            single_block,
            lang,
            tessdata,
            json,
        } => {
            let config = PipelineConfig {
                recognition: RecognitionOptions {
                    profile: profile.into(),
                    single_block,
                    language: lang,
                },
                // Nothing stays on screen between photos
                reset_delay: Duration::ZERO,
                ..PipelineConfig::default()
            };
            let pipeline = ScanPipeline::new(
                config,
                TesseractBackend::new(tessdata.or_else(default_tessdata)),
                ConsoleSurface::new(json),
            );
            scan(&pipeline, &input, mode.into(), json).await
        }
        Commands::Preprocess {
            input,
            output,
            mode,
            data_uri,
        } => write_preprocessed(&input, &output, mode.into(), data_uri),
        Commands::Parse { input, json } => parse_text(&input, json),
    }
}

async fn scan<B: OcrBackend, S: ResultSurface>(
    pipeline: &ScanPipeline<B, S>,
    input: &Path,
    mode: CaptureMode,
    json: bool,
) -> Result<()> {
    let paths = inputs::collect_images(input)?;
    if paths.is_empty() {
        bail!("No images found in {}", input.display());
    }
    info!("Scanning {} photo(s) in {:?} mode", paths.len(), mode);

    for path in paths {
        let file = match SelectedFile::from_path(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let outcome = match mode {
            CaptureMode::Still => pipeline.capture_still(Some(file)).await,
            CaptureMode::Live => pipeline.capture_live(&PhotoFrame::new(file)).await,
        };

        match outcome {
            CaptureOutcome::Completed(report) if json => {
                let record = ScanRecord {
                    file: path.display().to_string(),
                    mode,
                    scanned_at: Utc::now(),
                    report: &report,
                };
                println!("{}", serde_json::to_string(&record)?);
            }
            CaptureOutcome::Completed(_) => {}
            CaptureOutcome::Ignored => warn!("Capture of {} was ignored", path.display()),
        }
    }
    Ok(())
}

fn write_preprocessed(input: &Path, output: &Path, mode: CaptureMode, data_uri: bool) -> Result<()> {
    let file = SelectedFile::from_path(input)?;
    let raster = acquire_from_file(Some(&file))?;
    let processed = preprocess(&raster, mode, &PreprocessConfig::default())?;

    std::fs::write(output, &processed.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        "Wrote {}x{} image to {}",
        processed.width,
        processed.height,
        output.display()
    );

    if data_uri {
        println!("{}", processed.data_uri());
    } else {
        println!("{}", processed.fingerprint());
    }
    Ok(())
}

fn parse_text(input: &str, json: bool) -> Result<()> {
    let text = if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        text
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };

    let report = report_for(&RecognitionResult {
        text,
        mean_confidence: None,
    });
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_report(&report));
    }
    Ok(())
}
