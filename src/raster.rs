//! Rasterization through Ghostscript
//!
//! Each composited page is written to a scoped temp file and rendered to
//! a JPEG by an external `gs` process running in non-interactive batch
//! mode, with the image routed through stdout. The renderer runs under a
//! deadline and its output goes through a validation chain before the
//! page is accepted; any failure drops only that page.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RasterFailure;
use crate::pdf::assemble::PageImage;

/// Environment variable that overrides the Ghostscript binary, e.g. to
/// point at a specific install or a stand-in during tests.
pub const GS_ENV_VAR: &str = "RASTERMARK_GS";

/// Rejection threshold: a render at or below this size on either axis is
/// treated as a renderer error, not a real page.
pub const MIN_RASTER_DIM: u32 = 10;

/// Per-page renderer invocation with fixed, non-interactive flags.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    program: PathBuf,
    dpi: u32,
    deadline: Duration,
    /// Receives `debug_gs_output_page_<N>.bin` artifacts on undecodable
    /// renderer output
    debug_dir: PathBuf,
}

impl Rasterizer {
    pub fn new(config: &Config) -> Self {
        let program = std::env::var_os(GS_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("gs"));
        Self {
            program,
            dpi: config.dpi,
            deadline: config.render_timeout,
            debug_dir: config.output_dir.clone(),
        }
    }

    /// Render one composited page to a validated JPEG.
    ///
    /// The temp file handed to the renderer is removed on every exit
    /// path, including timeouts and renderer crashes; the child process
    /// is killed if the deadline expires.
    pub async fn rasterize(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
    ) -> std::result::Result<PageImage, RasterFailure> {
        let mut page_file = tempfile::Builder::new()
            .prefix("rastermark-page-")
            .suffix(".pdf")
            .tempfile()?;
        page_file.write_all(pdf_bytes)?;
        page_file.flush()?;

        let mut command = Command::new(&self.program);
        command
            .args(["-dNOPAUSE", "-dBATCH", "-q", "-dSAFER"])
            .arg(format!("-r{}", self.dpi))
            .arg("-sDEVICE=jpeg")
            .args(["-o", "-"])
            .arg(page_file.path())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(page = page_index + 1, "running {:?}", command.as_std());

        let output = match timeout(self.deadline, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(RasterFailure::Spawn(err)),
            Err(_) => return Err(RasterFailure::Timeout(self.deadline)),
        };

        if !output.status.success() {
            return Err(RasterFailure::RendererExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !output.stderr.is_empty() {
            debug!(
                page = page_index + 1,
                "renderer stderr: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        validate_raster_output(&output.stdout, page_index, &self.debug_dir)
    }
}

/// Validation chain for renderer output: non-empty, decodable, and above
/// the degenerate-size threshold.
///
/// Undecodable bytes are persisted next to the output documents for
/// inspection; that artifact is not cleaned up automatically.
pub fn validate_raster_output(
    bytes: &[u8],
    page_index: usize,
    debug_dir: &Path,
) -> std::result::Result<PageImage, RasterFailure> {
    if bytes.is_empty() {
        return Err(RasterFailure::EmptyOutput);
    }

    let decoded = match image::load_from_memory(bytes) {
        Ok(decoded) => decoded,
        Err(err) => {
            let debug_path = debug_dir.join(format!("debug_gs_output_page_{}.bin", page_index + 1));
            if let Err(write_err) = std::fs::write(&debug_path, bytes) {
                warn!(
                    page = page_index + 1,
                    "could not save renderer output for inspection: {write_err}"
                );
            }
            return Err(RasterFailure::UndecodableOutput {
                debug_path,
                reason: err.to_string(),
            });
        }
    };

    let (width, height) = (decoded.width(), decoded.height());
    if width <= MIN_RASTER_DIM || height <= MIN_RASTER_DIM {
        return Err(RasterFailure::UndersizedOutput { width, height });
    }

    let grayscale = matches!(
        decoded.color(),
        image::ColorType::L8 | image::ColorType::La8
    );

    Ok(PageImage {
        index: page_index,
        width,
        height,
        grayscale,
        jpeg: bytes.to_vec(),
    })
}
