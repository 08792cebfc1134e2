//! Output assembly
//!
//! Encodes the ordered set of rasterized page images into a single
//! multi-page PDF. Each page is one full-bleed JPEG image XObject; the
//! page is sized so that the image's pixel dimensions map back to the
//! physical size they were rendered at.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, Stream};

use crate::error::{Error, Result};

/// A rasterized page ready for assembly: raw JPEG bytes plus the decoded
/// dimensions that validation established.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based index of the page in the source document
    pub index: usize,
    /// Pixel width of the decoded image
    pub width: u32,
    /// Pixel height of the decoded image
    pub height: u32,
    /// Whether the JPEG is single-channel (DeviceGray) rather than RGB
    pub grayscale: bool,
    /// Raw JPEG bytes exactly as the renderer produced them
    pub jpeg: Vec<u8>,
}

/// Page size in points for an image rendered at `dpi`.
pub fn page_size_points(width: u32, height: u32, dpi: u32) -> (f64, f64) {
    (
        f64::from(width) * 72.0 / f64::from(dpi),
        f64::from(height) * 72.0 / f64::from(dpi),
    )
}

/// Build a multi-page document from the ordered images.
///
/// Fails with `NoSurvivingPages` if the sequence is empty: an output
/// with zero pages must never be produced.
pub fn assemble_document(images: &[PageImage], dpi: u32) -> Result<Document> {
    if images.is_empty() {
        return Err(Error::NoSurvivingPages);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(images.len());
    for image in images {
        let (width_pt, height_pt) = page_size_points(image.width, image.height, dpi);

        // JPEG bytes go into the stream as-is; DCTDecode is the JPEG
        // codec, so no recompression may be applied on top.
        let xobject = Stream {
            dict: image_xobject_dict(image),
            content: image.jpeg.clone(),
            allows_compression: false,
            start_position: None,
        };
        let xobject_id = doc.add_object(Object::Stream(xobject));

        let content = format!("q\n{:.2} 0 0 {:.2} 0 0 cm\n/Im0 Do\nQ\n", width_pt, height_pt);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

        let mut xobjects = Dictionary::new();
        xobjects.set("Im0", Object::Reference(xobject_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width_pt as f32),
                Object::Real(height_pt as f32),
            ]),
        );
        page.set("Contents", Object::Reference(content_id));
        page.set("Resources", Object::Dictionary(resources));
        kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc.compress();
    Ok(doc)
}

/// Assemble and write the output document, creating parent directories
/// as needed.
pub fn write_document(images: &[PageImage], dpi: u32, output_path: &Path) -> Result<()> {
    let mut doc = assemble_document(images, dpi)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(Error::OutputWrite)?;
        }
    }

    let file = File::create(output_path).map_err(Error::OutputWrite)?;
    let mut writer = BufWriter::new(file);
    doc.save_to(&mut writer)?;
    Ok(())
}

fn image_xobject_dict(image: &PageImage) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(i64::from(image.width)));
    dict.set("Height", Object::Integer(i64::from(image.height)));
    let color_space: &[u8] = if image.grayscale {
        b"DeviceGray"
    } else {
        b"DeviceRGB"
    };
    dict.set("ColorSpace", Object::Name(color_space.to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    dict
}
