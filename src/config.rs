//! Pipeline configuration
//!
//! All recognized options live here as named fields with named defaults,
//! passed explicitly into the pipeline at construction. Nothing reads
//! ambient globals.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default watermark text
pub const DEFAULT_TEXT: &str = "Contract renewal Agency XYZ 010125";
/// Default watermark font size in points
pub const DEFAULT_FONT_SIZE: f64 = 20.0;
/// Default watermark rotation in degrees
pub const DEFAULT_ANGLE: f64 = 45.0;
/// Default watermark opacity (0.0-1.0)
pub const DEFAULT_OPACITY: f64 = 0.15;
/// Default tiling density percentage
pub const DEFAULT_DENSITY: f64 = 100.0;
/// Default rasterization resolution in dots per inch
pub const DEFAULT_DPI: u32 = 300;
/// Default output directory
pub const DEFAULT_OUTPUT_DIR: &str = "output_image";
/// Default cap on concurrent renderer processes
pub const DEFAULT_JOBS: usize = 4;
/// Default per-page renderer deadline in seconds
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 120;

/// Configuration for one run of the pipeline. One instance is shared by
/// every input document of a run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Watermark text repeated across each page
    pub text: String,
    /// Watermark font size in points
    pub font_size: f64,
    /// Watermark rotation angle in degrees (unconstrained; wraps)
    pub angle_degrees: f64,
    /// Watermark opacity, 0.0 (invisible) to 1.0 (opaque)
    pub opacity: f64,
    /// Tiling density percentage; 100 tiles at the text's own footprint
    pub density: f64,
    /// Resolution used when rasterizing composited pages
    pub dpi: u32,
    /// Directory that receives output PDFs and debug artifacts
    pub output_dir: PathBuf,
    /// Maximum concurrent renderer processes across the whole run
    pub max_parallel_renders: usize,
    /// Deadline for a single renderer invocation
    pub render_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            angle_degrees: DEFAULT_ANGLE,
            opacity: DEFAULT_OPACITY,
            density: DEFAULT_DENSITY,
            dpi: DEFAULT_DPI,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_parallel_renders: DEFAULT_JOBS,
            render_timeout: Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Reject degenerate settings before any document is touched.
    ///
    /// A zero or negative size/density would produce a zero-length tile
    /// step; empty text has no footprint at all.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::InvalidWatermark(
                "watermark text must not be empty".to_string(),
            ));
        }
        if self.font_size <= 0.0 {
            return Err(Error::InvalidWatermark(format!(
                "font size must be positive, got {}",
                self.font_size
            )));
        }
        if self.density <= 0.0 {
            return Err(Error::InvalidWatermark(format!(
                "density must be positive, got {}",
                self.density
            )));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(Error::InvalidWatermark(format!(
                "opacity must be between 0.0 and 1.0, got {}",
                self.opacity
            )));
        }
        if self.dpi == 0 {
            return Err(Error::InvalidWatermark(
                "dpi must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dpi, 300);
        assert_eq!(config.output_dir, PathBuf::from("output_image"));
    }

    #[test]
    fn test_rejects_empty_text() {
        let config = Config {
            text: "   ".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidWatermark(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_size_and_density() {
        let config = Config {
            font_size: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            density: -1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_opacity() {
        let config = Config {
            opacity: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            opacity: -0.1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
