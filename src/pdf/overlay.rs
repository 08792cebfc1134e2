//! Watermark overlay generation
//!
//! Builds a single-page PDF containing the watermark text tiled across a
//! square region, rotated about the page center, and drawn at low opacity
//! over a transparent background. The overlay is generated once per
//! document (sized to the first page) and merged onto every page.

use lopdf::{Dictionary, Document, Object, Stream};

use crate::config::Config;
use crate::error::{Error, Result};

/// Watermark parameters resolved against a concrete page size.
///
/// Immutable once constructed; construction rejects degenerate values.
#[derive(Debug, Clone)]
pub struct WatermarkSpec {
    pub text: String,
    pub font_size: f64,
    pub angle_degrees: f64,
    pub opacity: f64,
    pub density: f64,
    pub page_width: f64,
    pub page_height: f64,
}

impl WatermarkSpec {
    /// Build a spec from run configuration and the document's page size.
    pub fn from_config(config: &Config, page_width: f64, page_height: f64) -> Result<Self> {
        config.validate()?;
        let spec = Self {
            text: config.text.clone(),
            font_size: config.font_size,
            angle_degrees: config.angle_degrees,
            opacity: config.opacity,
            density: config.density,
            page_width,
            page_height,
        };
        // Validates that the truncated tile steps are usable.
        spec.tile_steps()?;
        Ok(spec)
    }

    /// Estimated horizontal footprint of the text in points.
    ///
    /// A constant-factor approximation of glyph advance width, not real
    /// font metrics. Changing this changes the visible tiling density.
    fn text_width_estimate(&self) -> f64 {
        self.font_size * self.text.chars().count() as f64 * 0.6
    }

    /// Integer tile steps along x and y.
    ///
    /// Steps are truncated to whole points; a step that truncates to
    /// zero would make the tiling loop either infinite or empty, so it
    /// is rejected here.
    fn tile_steps(&self) -> Result<(i64, i64)> {
        let step_x = (self.text_width_estimate() * self.density / 100.0) as i64;
        let step_y = (self.font_size * 2.0 * self.density / 100.0) as i64;
        if step_x < 1 || step_y < 1 {
            return Err(Error::InvalidWatermark(format!(
                "tile step truncates to zero ({}x{}); increase font size or density",
                step_x, step_y
            )));
        }
        Ok((step_x, step_y))
    }

    /// Generate the overlay page's content stream.
    ///
    /// The tiled field covers a square of side 1.5x the larger page
    /// dimension, centered on the page, so the page stays fully covered
    /// after rotation.
    fn content_stream(&self) -> Result<String> {
        let (step_x, step_y) = self.tile_steps()?;
        let side = self.page_width.max(self.page_height) * 1.5;
        let start = (-side / 2.0) as i64;
        let end = (side / 2.0) as i64;

        let (sin, cos) = self.angle_degrees.to_radians().sin_cos();
        let escaped = escape_pdf_string(&self.text);
        let half_width = self.text_width_estimate() / 2.0;

        let mut content = String::new();
        content.push_str("q\n");
        content.push_str("/WmGS gs\n");
        content.push_str("0 g\n");
        // Translate to page center, then rotate; tiles are laid out in
        // the rotated frame.
        content.push_str(&format!(
            "1 0 0 1 {:.2} {:.2} cm\n",
            self.page_width / 2.0,
            self.page_height / 2.0
        ));
        content.push_str(&format!(
            "{:.6} {:.6} {:.6} {:.6} 0 0 cm\n",
            cos, sin, -sin, cos
        ));

        let mut x = start;
        while x < end {
            let mut y = start;
            while y < end {
                content.push_str("BT\n");
                content.push_str(&format!("/WmF0 {:.2} Tf\n", self.font_size));
                // Center-anchored: shift left by half the estimated width.
                content.push_str(&format!(
                    "1 0 0 1 {:.2} {} Tm\n",
                    x as f64 - half_width,
                    y
                ));
                content.push_str(&format!("({}) Tj\n", escaped));
                content.push_str("ET\n");
                y += step_y;
            }
            x += step_x;
        }

        content.push_str("Q\n");
        Ok(content)
    }

    /// Build the single-page overlay document.
    ///
    /// The page is sized exactly `page_width x page_height`; resources
    /// carry the font as /WmF0 and the alpha graphics state as /WmGS.
    pub fn build_overlay(&self) -> Result<Document> {
        let content = self.content_stream()?;

        let mut doc = Document::with_version("1.5");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let font_id = doc.add_object(Object::Dictionary(helvetica_bold()));
        let gstate_id = doc.add_object(Object::Dictionary(alpha_gstate(self.opacity)));

        // Resource names are prefixed so merging them into a source page
        // cannot shadow the page's own /F1-style entries.
        let mut fonts = Dictionary::new();
        fonts.set("WmF0", Object::Reference(font_id));
        let mut gstates = Dictionary::new();
        gstates.set("WmGS", Object::Reference(gstate_id));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));
        resources.set("ExtGState", Object::Dictionary(gstates));

        let pages_id = doc.new_object_id();

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(self.page_width as f32),
                Object::Real(self.page_height as f32),
            ]),
        );
        page.set("Contents", Object::Reference(content_id));
        page.set("Resources", Object::Dictionary(resources));
        let page_id = doc.add_object(Object::Dictionary(page));

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(1));
        pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));

        doc.trailer.set("Root", Object::Reference(catalog_id));
        Ok(doc)
    }
}

/// Standard Helvetica-Bold Type1 font (one of the 14 base PDF fonts, no
/// embedding required)
fn helvetica_bold() -> Dictionary {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica-Bold".to_vec()));
    font
}

/// Graphics state applying the watermark alpha to fills and strokes
fn alpha_gstate(opacity: f64) -> Dictionary {
    let mut gstate = Dictionary::new();
    gstate.set("Type", Object::Name(b"ExtGState".to_vec()));
    gstate.set("ca", Object::Real(opacity as f32));
    gstate.set("CA", Object::Real(opacity as f32));
    gstate
}

/// Escape special characters in PDF literal strings
fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(text: &str, size: f64, density: f64) -> WatermarkSpec {
        WatermarkSpec {
            text: text.to_string(),
            font_size: size,
            angle_degrees: 45.0,
            opacity: 0.15,
            density,
            page_width: 612.0,
            page_height: 792.0,
        }
    }

    #[test]
    fn test_tile_steps_match_footprint_formula() {
        // "TEST" at size 20: footprint = 20 * 4 * 0.6 = 48
        let (step_x, step_y) = spec("TEST", 20.0, 100.0).tile_steps().unwrap();
        assert_eq!(step_x, 48);
        assert_eq!(step_y, 40);

        // Halving density halves both steps
        let (step_x, step_y) = spec("TEST", 20.0, 50.0).tile_steps().unwrap();
        assert_eq!(step_x, 24);
        assert_eq!(step_y, 20);
    }

    #[test]
    fn test_degenerate_steps_rejected() {
        // size 1, density 1 truncates step_y to 0
        assert!(spec("TEST", 1.0, 1.0).tile_steps().is_err());
    }

    #[test]
    fn test_overlay_page_sized_to_spec() {
        for text in ["TEST", "a much longer watermark string"] {
            let doc = spec(text, 20.0, 100.0).build_overlay().unwrap();
            let pages = doc.get_pages();
            assert_eq!(pages.len(), 1);

            let page_id = *pages.values().next().unwrap();
            let page = doc.get_object(page_id).unwrap();
            let Object::Dictionary(dict) = page else {
                panic!("page is not a dictionary");
            };
            let Object::Array(media_box) = dict.get(b"MediaBox").unwrap() else {
                panic!("MediaBox is not an array");
            };
            assert_eq!(media_box.len(), 4);
            let Object::Real(width) = &media_box[2] else {
                panic!("width is not a real");
            };
            let Object::Real(height) = &media_box[3] else {
                panic!("height is not a real");
            };
            assert_eq!(*width, 612.0);
            assert_eq!(*height, 792.0);
        }
    }

    #[test]
    fn test_content_stream_draws_rotated_translucent_tiles() {
        let content = spec("TEST", 20.0, 100.0).content_stream().unwrap();
        assert!(content.contains("/WmGS gs"));
        assert!(content.contains("(TEST) Tj"));
        // Translate to page center
        assert!(content.contains("1 0 0 1 306.00 396.00 cm"));
        // Dozens of tiles for a letter-size page at default density
        assert!(content.matches("Tj").count() > 100);
    }

    #[test]
    fn test_pdf_string_escaping() {
        assert_eq!(escape_pdf_string("a(b)c"), "a\\(b\\)c");
        assert_eq!(escape_pdf_string("back\\slash"), "back\\\\slash");
        let content = spec("CONFIDENTIAL (draft)", 20.0, 100.0)
            .content_stream()
            .unwrap();
        assert!(content.contains("(CONFIDENTIAL \\(draft\\)) Tj"));
    }

    #[test]
    fn test_from_config_rejects_degenerate_inputs() {
        let config = Config {
            font_size: 0.0,
            ..Config::default()
        };
        assert!(WatermarkSpec::from_config(&config, 612.0, 792.0).is_err());

        let config = Config {
            density: 0.0,
            ..Config::default()
        };
        assert!(WatermarkSpec::from_config(&config, 612.0, 792.0).is_err());
    }
}
