//! Pipeline orchestration
//!
//! Drives one input document through classify → convert/load → overlay
//! generation → per-page compositing → bounded-concurrency rasterization
//! → output assembly. Per-page failures are isolated at the page
//! boundary; document-level failures abort only the document at hand.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lopdf::{Document, Object};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, PageFailure, RasterFailure, Result, SkippedPage};
use crate::input::{self, InputKind};
use crate::pdf::assemble;
use crate::pdf::composite::composite_document;
use crate::pdf::overlay::WatermarkSpec;
use crate::raster::Rasterizer;

/// Outcome of one document's run: where the output went and which pages
/// were dropped along the way.
#[derive(Debug)]
pub struct PipelineReport {
    /// Path of the written output document
    pub output_path: PathBuf,
    /// Pages in the source document
    pub page_count: usize,
    /// Pages that made it into the output
    pub surviving: usize,
    /// Pages dropped during compositing or rasterization, in the order
    /// the failures were observed
    pub skipped: Vec<SkippedPage>,
}

/// Watermark-and-rasterize pipeline. One instance processes any number
/// of documents; renderer concurrency is capped across all of them.
pub struct Pipeline {
    config: Config,
    render_permits: Arc<Semaphore>,
}

impl Pipeline {
    /// Build a pipeline, validating the watermark settings up front.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let render_permits = Arc::new(Semaphore::new(config.max_parallel_renders.max(1)));
        Ok(Self {
            config,
            render_permits,
        })
    }

    /// Process a single input file and write its watermarked, rasterized
    /// counterpart into the output directory.
    pub async fn process_file(&self, input_path: &Path) -> Result<PipelineReport> {
        if !input_path.exists() {
            return Err(Error::InputNotFound(input_path.to_path_buf()));
        }

        let pdf_bytes = match input::classify(input_path)? {
            InputKind::Document => std::fs::read(input_path)?,
            InputKind::Image => {
                info!("converting image {} to PDF", input_path.display());
                input::image_to_pdf_bytes(input_path)?
            }
        };

        let source = Document::load_mem(&pdf_bytes)?;
        let pages = source.get_pages();
        if pages.is_empty() {
            return Err(Error::NoPages(input_path.to_path_buf()));
        }

        // The overlay is generated once, sized to the first page; all
        // pages of a document are assumed to share its dimensions.
        let (page_width, page_height) = first_page_dimensions(&source);
        let spec = WatermarkSpec::from_config(&self.config, page_width, page_height)?;
        let overlay = spec.build_overlay()?;

        info!(
            pages = pages.len(),
            width = page_width,
            height = page_height,
            "compositing watermark overlay"
        );
        let (composited, mut skipped) = composite_document(&source, &overlay);

        info!(
            pages = composited.len(),
            dpi = self.config.dpi,
            "rasterizing watermarked pages"
        );
        let rasterizer = Arc::new(Rasterizer::new(&self.config));

        let mut tasks = Vec::with_capacity(composited.len());
        for page in composited {
            let rasterizer = Arc::clone(&rasterizer);
            let permits = Arc::clone(&self.render_permits);
            let index = page.index;
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                rasterizer.rasterize(&page.bytes, index).await
            });
            tasks.push((index, handle));
        }

        let mut images = Vec::with_capacity(tasks.len());
        for (index, handle) in tasks {
            match handle.await {
                Ok(Ok(image)) => {
                    info!(
                        page = index + 1,
                        width = image.width,
                        height = image.height,
                        "rasterized"
                    );
                    images.push(image);
                }
                Ok(Err(failure)) => {
                    warn!(page = index + 1, "skipping page, {failure}");
                    skipped.push(SkippedPage {
                        index,
                        failure: PageFailure::Rasterize(failure),
                    });
                }
                Err(join_err) => {
                    warn!(page = index + 1, "skipping page, render task failed: {join_err}");
                    skipped.push(SkippedPage {
                        index,
                        failure: PageFailure::Rasterize(RasterFailure::Task(
                            join_err.to_string(),
                        )),
                    });
                }
            }
        }
        images.sort_by_key(|image| image.index);

        if images.is_empty() {
            return Err(Error::NoSurvivingPages);
        }

        let output_path = self.output_path_for(input_path);
        assemble::write_document(&images, self.config.dpi, &output_path)?;
        info!(
            surviving = images.len(),
            total = pages.len(),
            "wrote {}",
            output_path.display()
        );

        Ok(PipelineReport {
            output_path,
            page_count: pages.len(),
            surviving: images.len(),
            skipped,
        })
    }

    fn output_path_for(&self, input_path: &Path) -> PathBuf {
        let stem = input_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        self.config
            .output_dir
            .join(format!("{stem}_watermarked_rasterized.pdf"))
    }
}

/// Width and height of the first page in points.
///
/// MediaBox may sit on the page itself, behind an indirect reference, or
/// on an ancestor Pages node; the walk is depth-limited so malformed
/// parent cycles cannot hang it. US Letter is the fallback.
fn first_page_dimensions(doc: &Document) -> (f64, f64) {
    let Some(&page_id) = doc.get_pages().values().next() else {
        return (612.0, 792.0);
    };

    let mut current = page_id;
    for _ in 0..10 {
        let Ok(Object::Dictionary(dict)) = doc.get_object(current) else {
            break;
        };

        if let Ok(media_box_obj) = dict.get(b"MediaBox") {
            let array = match media_box_obj {
                Object::Array(array) => Some(array.clone()),
                Object::Reference(id) => match doc.get_object(*id) {
                    Ok(Object::Array(array)) => Some(array.clone()),
                    _ => None,
                },
                _ => None,
            };
            if let Some(array) = array {
                if array.len() == 4 {
                    let values: Vec<f64> = array
                        .iter()
                        .filter_map(|obj| match obj {
                            Object::Integer(i) => Some(*i as f64),
                            Object::Real(r) => Some(f64::from(*r)),
                            _ => None,
                        })
                        .collect();
                    if values.len() == 4 {
                        return (values[2] - values[0], values[3] - values[1]);
                    }
                }
            }
        }

        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current = *parent_id,
            _ => break,
        }
    }

    warn!("first page has no resolvable MediaBox, assuming US Letter");
    (612.0, 792.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_naming() {
        let pipeline = Pipeline::new(Config {
            output_dir: PathBuf::from("/tmp/out"),
            ..Config::default()
        })
        .unwrap();

        assert_eq!(
            pipeline.output_path_for(Path::new("/data/contract.pdf")),
            PathBuf::from("/tmp/out/contract_watermarked_rasterized.pdf")
        );
        assert_eq!(
            pipeline.output_path_for(Path::new("photo.jpeg")),
            PathBuf::from("/tmp/out/photo_watermarked_rasterized.pdf")
        );
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            opacity: 2.0,
            ..Config::default()
        };
        assert!(Pipeline::new(config).is_err());
    }
}
