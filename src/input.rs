//! Input classification and image-to-PDF conversion
//!
//! Inputs are classified by their declared media type (file extension);
//! when that is inconclusive the bytes are sniffed as an image before
//! giving up. Image inputs are wrapped into a single-page PDF so the
//! rest of the pipeline only ever sees documents.

use std::io::Cursor;
use std::path::Path;

use image::ImageFormat;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pdf::assemble::{assemble_document, PageImage};

/// What an input path turned out to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Already a PDF document
    Document,
    /// A raster image that needs conversion before watermarking
    Image,
}

/// Pixel-to-point mapping used when wrapping an image into a PDF page.
/// Matches the common screen-image convention of 96 pixels per inch.
const IMAGE_PAGE_DPI: u32 = 96;

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp",
];

/// Classify an input file as document or image.
///
/// Extension first; unknown extensions get a content sniff via the image
/// decoder. Files that are neither are an `UnrecognizedFormat` failure.
pub fn classify(path: &Path) -> Result<InputKind> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => Ok(InputKind::Document),
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Ok(InputKind::Image),
        _ => {
            let bytes = std::fs::read(path)?;
            if image::guess_format(&bytes).is_ok() {
                debug!(
                    "media type of {} unknown, but content sniffs as an image",
                    path.display()
                );
                Ok(InputKind::Image)
            } else {
                Err(Error::UnrecognizedFormat(path.to_path_buf()))
            }
        }
    }
}

/// Convert an image file into the bytes of a single-page PDF.
///
/// JPEG inputs are embedded as-is; anything else is decoded and
/// re-encoded to JPEG first (everything gets rasterized downstream, so
/// nothing is lost that the pipeline would have kept).
pub fn image_to_pdf_bytes(path: &Path) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;
    let format = image::guess_format(&bytes)?;
    let decoded = image::load_from_memory(&bytes)?;

    let (width, height) = (decoded.width(), decoded.height());
    let grayscale = matches!(
        decoded.color(),
        image::ColorType::L8 | image::ColorType::La8
    );

    let jpeg = if format == ImageFormat::Jpeg {
        bytes
    } else {
        let mut reencoded = Vec::new();
        if grayscale {
            image::DynamicImage::ImageLuma8(decoded.to_luma8())
                .write_to(&mut Cursor::new(&mut reencoded), ImageFormat::Jpeg)?;
        } else {
            image::DynamicImage::ImageRgb8(decoded.to_rgb8())
                .write_to(&mut Cursor::new(&mut reencoded), ImageFormat::Jpeg)?;
        }
        reencoded
    };

    let page = PageImage {
        index: 0,
        width,
        height,
        grayscale,
        jpeg,
    };

    let mut doc = assemble_document(&[page], IMAGE_PAGE_DPI)?;
    let mut pdf_bytes = Vec::new();
    doc.save_to(&mut pdf_bytes)?;
    Ok(pdf_bytes)
}
