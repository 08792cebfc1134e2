//! Rastermark Library
//!
//! Applies a tiled, rotated, translucent text watermark to images and
//! PDFs, then rasterizes every page through Ghostscript so the watermark
//! cannot be stripped by editing a text layer. This library provides
//! functionality to:
//! - Generate a tiled text watermark overlay sized to a document's pages
//! - Composite the overlay onto every page, with per-page validation
//! - Rasterize composited pages through an external renderer
//! - Reassemble the rasterized pages into a single output PDF
//!
//! # Example
//!
//! ```no_run
//! use rastermark::{Config, Pipeline};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> rastermark::Result<()> {
//! let pipeline = Pipeline::new(Config::default())?;
//! let report = pipeline.process_file(Path::new("contract.pdf")).await?;
//! println!("{} of {} pages survived", report.surviving, report.page_count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod input;
pub mod pdf;
pub mod pipeline;
pub mod raster;

// Re-export commonly used items
pub use config::Config;
pub use error::{Error, PageFailure, RasterFailure, Result, SkippedPage};
pub use pipeline::{Pipeline, PipelineReport};
