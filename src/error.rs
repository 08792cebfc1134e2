//! Error types for the watermark rasterization pipeline

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Document-level errors. Each of these is fatal for the document being
/// processed, but never for the run as a whole: the CLI moves on to the
/// next input after reporting it.
#[derive(Error, Debug)]
pub enum Error {
    /// Input path does not exist
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Input is neither a recognized image nor a PDF
    #[error("unrecognized input format (neither image nor PDF): {}", .0.display())]
    UnrecognizedFormat(PathBuf),

    /// Source document contains no pages
    #[error("document has no pages: {}", .0.display())]
    NoPages(PathBuf),

    /// Degenerate watermark settings (empty text, non-positive size or
    /// density, opacity outside 0.0-1.0)
    #[error("invalid watermark settings: {0}")]
    InvalidWatermark(String),

    /// Every page was skipped during compositing or rasterization
    #[error("no pages survived rasterization; output not written")]
    NoSurvivingPages,

    /// Output document could not be written
    #[error("failed to write output document: {0}")]
    OutputWrite(#[source] std::io::Error),

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Image decoding/encoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

/// Why a single page was dropped from the output. Recoverable: recorded,
/// logged, and the remaining pages continue through the pipeline.
#[derive(Error, Debug)]
pub enum PageFailure {
    /// Merging the overlay produced a document that failed the
    /// re-parse/re-serialize round-trip
    #[error("compositing failed: {0}")]
    Composite(String),

    /// The external renderer failed to produce a usable image
    #[error("rasterization failed: {0}")]
    Rasterize(RasterFailure),
}

/// Rasterization failure subtypes, one per validation step of the
/// renderer invocation.
#[derive(Error, Debug)]
pub enum RasterFailure {
    /// Renderer exited non-zero; stderr is the captured diagnostic text
    #[error("renderer exited with code {code}: {stderr}")]
    RendererExit { code: i32, stderr: String },

    /// Renderer exited zero but wrote nothing to stdout
    #[error("renderer produced no output")]
    EmptyOutput,

    /// Renderer output did not decode as an image; raw bytes kept for
    /// inspection
    #[error("renderer output is not a decodable image ({reason}); raw bytes saved to {}", .debug_path.display())]
    UndecodableOutput { debug_path: PathBuf, reason: String },

    /// Decoded image is at or below the 10x10 minimum on some axis,
    /// which indicates a degenerate render
    #[error("rendered image is {width}x{height} pixels, at or below the 10x10 minimum")]
    UndersizedOutput { width: u32, height: u32 },

    /// Renderer did not finish within the configured deadline
    #[error("renderer timed out after {0:?}")]
    Timeout(Duration),

    /// Renderer process could not be launched
    #[error("failed to launch renderer: {0}")]
    Spawn(#[source] std::io::Error),

    /// IO error while staging the page for rendering
    #[error("IO error preparing page for rendering: {0}")]
    Io(#[from] std::io::Error),

    /// The render task itself died (e.g. panicked)
    #[error("render task failed: {0}")]
    Task(String),
}

/// A page that was dropped from the output, with its 0-based index in the
/// source document and the reason.
#[derive(Debug)]
pub struct SkippedPage {
    pub index: usize,
    pub failure: PageFailure,
}
