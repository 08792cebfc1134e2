//! Rastermark CLI tool
//!
//! Applies a hard-to-remove rasterized text watermark to images and PDFs.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use glob::glob;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rastermark::{config, Config, Pipeline};

/// Rastermark - watermark images and PDFs, then rasterize every page
#[derive(Parser)]
#[command(name = "rastermark")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Watermark a PDF with the default text
    rastermark contract.pdf

    # Watermark every scan in a folder with custom text
    rastermark -t \"CONFIDENTIAL\" -o confidential/ scans/*.jpg

    # Denser, darker watermark at a lower render resolution
    rastermark -t \"DRAFT\" -p 0.3 -d 60 --dpi 150 report.pdf")]
struct Cli {
    /// Input image(s) or PDF(s). Supports glob patterns like "*.pdf"
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = config::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Watermark text
    #[arg(short, long, default_value = config::DEFAULT_TEXT)]
    text: String,

    /// Font size of the watermark text in points
    #[arg(short = 's', long, default_value_t = config::DEFAULT_FONT_SIZE)]
    size: f64,

    /// Rotation angle of the watermark text in degrees
    #[arg(short, long, default_value_t = config::DEFAULT_ANGLE)]
    angle: f64,

    /// Opacity of the watermark text (0.0-1.0)
    #[arg(short = 'p', long, default_value_t = config::DEFAULT_OPACITY)]
    opacity: f64,

    /// Density of the watermark repetition, as a percentage
    #[arg(short, long, default_value_t = config::DEFAULT_DENSITY)]
    density: f64,

    /// Resolution for rasterization, in dots per inch
    #[arg(long, default_value_t = config::DEFAULT_DPI)]
    dpi: u32,

    /// Maximum concurrent renderer processes
    #[arg(long, default_value_t = config::DEFAULT_JOBS)]
    jobs: usize,

    /// Per-page renderer timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_RENDER_TIMEOUT_SECS)]
    render_timeout: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let inputs = expand_globs(cli.inputs)?;

    let config = Config {
        text: cli.text,
        font_size: cli.size,
        angle_degrees: cli.angle,
        opacity: cli.opacity,
        density: cli.density,
        dpi: cli.dpi,
        output_dir: cli.output_dir,
        max_parallel_renders: cli.jobs,
        render_timeout: Duration::from_secs(cli.render_timeout),
    };

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let pipeline = Pipeline::new(config)?;

    let mut failures = 0usize;
    for input in &inputs {
        info!("processing {}", input.display());
        match pipeline.process_file(input).await {
            Ok(report) => {
                if report.skipped.is_empty() {
                    info!("finished {}", input.display());
                } else {
                    info!(
                        "finished {} ({} of {} pages written)",
                        input.display(),
                        report.surviving,
                        report.page_count
                    );
                }
            }
            Err(e) => {
                error!("{}: {e}", input.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} input file(s) failed", inputs.len());
    }
    Ok(())
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            for entry in glob(&pattern)? {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => error!("glob error for {pattern}: {e}"),
                }
            }
            if !matched {
                bail!("no files matched pattern: {pattern}");
            }
        } else {
            // No glob characters, treat as literal path
            paths.push(PathBuf::from(pattern));
        }
    }

    paths.sort();
    Ok(paths)
}
