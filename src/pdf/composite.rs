//! Page compositing
//!
//! Merges the watermark overlay onto every page of a source document.
//! Each page is extracted into its own single-page document, the overlay
//! content is layered on top of (not replacing) the page's content, and
//! the result is re-encoded, re-parsed, and re-encoded again to confirm
//! it is structurally consistent before it is handed to the renderer.
//! Pages are independent: a failure on one page is recorded and the rest
//! continue.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::warn;

use crate::error::{Error, PageFailure, Result, SkippedPage};

/// A single watermarked page, re-encoded as a standalone one-page PDF
/// that has survived the structural round-trip.
#[derive(Debug, Clone)]
pub struct CompositedPage {
    /// 0-based index of the page in the source document
    pub index: usize,
    /// Serialized single-page PDF
    pub bytes: Vec<u8>,
}

/// Composite the overlay onto every page of `source`.
///
/// Returns the surviving pages in original order plus a record of every
/// skipped page. Never fails as a whole: per-page errors are caught at
/// the page boundary.
pub fn composite_document(
    source: &Document,
    overlay: &Document,
) -> (Vec<CompositedPage>, Vec<SkippedPage>) {
    let mut composited = Vec::new();
    let mut skipped = Vec::new();

    for (index, (&page_no, _)) in source.get_pages().iter().enumerate() {
        match composite_page(source, page_no, overlay) {
            Ok(bytes) => composited.push(CompositedPage { index, bytes }),
            Err(err) => {
                warn!(page = index + 1, "skipping page, compositing failed: {err}");
                skipped.push(SkippedPage {
                    index,
                    failure: PageFailure::Composite(err.to_string()),
                });
            }
        }
    }

    (composited, skipped)
}

/// Composite one page: extract, overlay, serialize, and round-trip.
fn composite_page(source: &Document, page_no: u32, overlay: &Document) -> Result<Vec<u8>> {
    let mut single = extract_single_page(source, page_no)?;
    apply_overlay(&mut single, overlay)?;

    let mut merged = Vec::new();
    single.save_to(&mut merged)?;

    // A page only counts as composited once its bytes re-parse and
    // re-serialize; anything that fails the round-trip is skipped, not
    // retried.
    let mut revalidated = Document::load_mem(&merged)?;
    let mut validated_bytes = Vec::new();
    revalidated.save_to(&mut validated_bytes)?;

    Ok(validated_bytes)
}

/// Reduce a document to a single page by restructuring the Pages tree to
/// reference only the target page, then dropping unreachable objects.
fn extract_single_page(source: &Document, page_no: u32) -> Result<Document> {
    let mut single = source.clone();

    let page_id = *single
        .get_pages()
        .get(&page_no)
        .ok_or_else(|| Error::General(format!("page {page_no} not found in source")))?;

    let root_ref = single
        .trailer
        .get(b"Root")
        .map_err(|_| Error::General("document has no Root".to_string()))?;
    let catalog_id = match root_ref {
        Object::Reference(id) => *id,
        _ => return Err(Error::General("Root is not a reference".to_string())),
    };

    let pages_id = {
        let catalog = single.get_object(catalog_id)?;
        match catalog {
            Object::Dictionary(dict) => match dict.get(b"Pages") {
                Ok(Object::Reference(id)) => *id,
                _ => {
                    return Err(Error::General(
                        "catalog has no Pages reference".to_string(),
                    ))
                }
            },
            _ => return Err(Error::General("catalog is not a dictionary".to_string())),
        }
    };

    if let Ok(Object::Dictionary(pages_dict)) = single.get_object_mut(pages_id) {
        pages_dict.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        pages_dict.set("Count", Object::Integer(1));
    }
    if let Ok(Object::Dictionary(page_dict)) = single.get_object_mut(page_id) {
        page_dict.set("Parent", Object::Reference(pages_id));
    }

    single.prune_objects();
    Ok(single)
}

/// Layer the overlay's page content on top of the target document's only
/// page, importing the overlay's objects under fresh IDs.
fn apply_overlay(doc: &mut Document, overlay: &Document) -> Result<()> {
    let id_offset = doc.max_id + 1;

    // Build the complete ID map first so references can be rewritten in
    // one pass.
    let mut id_map: HashMap<ObjectId, ObjectId> = HashMap::new();
    for old_id in overlay.objects.keys() {
        id_map.insert(*old_id, (old_id.0 + id_offset, old_id.1));
    }

    for (old_id, object) in overlay.objects.iter() {
        let new_object = renumber_object_references(object, &id_map);
        doc.objects.insert(id_map[old_id], new_object);
    }
    doc.max_id = overlay.max_id + id_offset;

    let (overlay_content_refs, overlay_resources) = overlay_page_parts(overlay, &id_map)?;

    let page_id = *doc
        .get_pages()
        .values()
        .next()
        .ok_or_else(|| Error::General("document has no page to composite".to_string()))?;

    // Resources may be an indirect reference; merge into an owned copy
    // and set it directly on the page.
    let mut resources = page_resources(doc, page_id);
    merge_resources(&mut resources, &overlay_resources);

    let page_obj = doc.get_object_mut(page_id)?;
    if let Object::Dictionary(ref mut page_dict) = page_obj {
        // Append overlay content after the page's own content so the
        // watermark draws on top.
        let existing = page_dict.get(b"Contents").ok().cloned();
        match existing {
            Some(Object::Reference(content_id)) => {
                let mut contents = vec![Object::Reference(content_id)];
                contents.extend(overlay_content_refs);
                page_dict.set("Contents", Object::Array(contents));
            }
            Some(Object::Array(mut contents)) => {
                contents.extend(overlay_content_refs);
                page_dict.set("Contents", Object::Array(contents));
            }
            _ => {
                page_dict.set("Contents", Object::Array(overlay_content_refs));
            }
        }

        page_dict.set("Resources", Object::Dictionary(resources));
    }

    Ok(())
}

/// Content stream references and resources of the overlay's page, with
/// object IDs remapped into the target document's ID space.
fn overlay_page_parts(
    overlay: &Document,
    id_map: &HashMap<ObjectId, ObjectId>,
) -> Result<(Vec<Object>, Object)> {
    let page_id = *overlay
        .get_pages()
        .values()
        .next()
        .ok_or_else(|| Error::General("overlay has no page".to_string()))?;
    let page_obj = overlay.get_object(page_id)?;

    let Object::Dictionary(page_dict) = page_obj else {
        return Err(Error::General("overlay page is not a dictionary".to_string()));
    };

    let content_refs = match page_dict.get(b"Contents") {
        Ok(content) => {
            let remapped = renumber_object_references(content, id_map);
            match remapped {
                Object::Reference(id) => vec![Object::Reference(id)],
                Object::Array(arr) => arr,
                other => vec![other],
            }
        }
        Err(_) => vec![],
    };

    let resources = match page_dict.get(b"Resources") {
        Ok(res) => renumber_object_references(res, id_map),
        Err(_) => Object::Dictionary(Dictionary::new()),
    };

    Ok((content_refs, resources))
}

/// Rewrite every object reference through the ID map.
fn renumber_object_references(object: &Object, id_map: &HashMap<ObjectId, ObjectId>) -> Object {
    match object {
        Object::Reference(old_id) => match id_map.get(old_id) {
            Some(new_id) => Object::Reference(*new_id),
            None => Object::Reference(*old_id),
        },
        Object::Array(arr) => Object::Array(
            arr.iter()
                .map(|obj| renumber_object_references(obj, id_map))
                .collect(),
        ),
        Object::Dictionary(dict) => {
            let mut new_dict = Dictionary::new();
            for (key, value) in dict.iter() {
                new_dict.set(key.clone(), renumber_object_references(value, id_map));
            }
            Object::Dictionary(new_dict)
        }
        Object::Stream(stream) => {
            let mut new_dict = Dictionary::new();
            for (key, value) in stream.dict.iter() {
                new_dict.set(key.clone(), renumber_object_references(value, id_map));
            }
            Object::Stream(lopdf::Stream {
                dict: new_dict,
                content: stream.content.clone(),
                allows_compression: stream.allows_compression,
                start_position: stream.start_position,
            })
        }
        _ => object.clone(),
    }
}

/// The page's Resources as an owned dictionary, following an indirect
/// reference if necessary.
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let Ok(Object::Dictionary(page_dict)) = doc.get_object(page_id) else {
        return Dictionary::new();
    };
    match page_dict.get(b"Resources") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(res_id)) => match doc.get_object(*res_id) {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        },
        _ => Dictionary::new(),
    }
}

/// Merge the overlay's resource categories (Font, ExtGState, ...) into
/// the page's resources, merging subdictionaries key by key.
fn merge_resources(target: &mut Dictionary, overlay_resources: &Object) {
    let Object::Dictionary(overlay_dict) = overlay_resources else {
        return;
    };

    for (key, value) in overlay_dict.iter() {
        let merged = match (target.get(key).ok(), value) {
            (Some(Object::Dictionary(existing)), Object::Dictionary(incoming)) => {
                let mut subdict = existing.clone();
                for (subkey, subvalue) in incoming.iter() {
                    subdict.set(subkey.clone(), subvalue.clone());
                }
                Object::Dictionary(subdict)
            }
            // Not both dictionaries: the overlay's entry wins.
            _ => value.clone(),
        };
        target.set(key.clone(), merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::overlay::WatermarkSpec;

    /// Minimal multi-page document with per-page text content and the
    /// given page sizes.
    fn build_source(page_sizes: &[(f32, f32)]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
        let font_id = doc.add_object(Object::Dictionary(font));

        let mut kids = Vec::new();
        for (i, &(width, height)) in page_sizes.iter().enumerate() {
            let content = format!("BT\n/F1 24 Tf\n72 700 Td\n(Page {}) Tj\nET\n", i + 1);
            let content_id =
                doc.add_object(lopdf::Stream::new(Dictionary::new(), content.into_bytes()));

            let mut fonts = Dictionary::new();
            fonts.set("F1", Object::Reference(font_id));
            let mut resources = Dictionary::new();
            resources.set("Font", Object::Dictionary(fonts));

            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
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

        doc
    }

    fn as_number(obj: &Object) -> f64 {
        match obj {
            Object::Integer(i) => *i as f64,
            Object::Real(r) => f64::from(*r),
            other => panic!("not a number: {other:?}"),
        }
    }

    fn test_overlay() -> Document {
        WatermarkSpec {
            text: "TEST".to_string(),
            font_size: 20.0,
            angle_degrees: 45.0,
            opacity: 0.15,
            density: 100.0,
            page_width: 612.0,
            page_height: 792.0,
        }
        .build_overlay()
        .unwrap()
    }

    #[test]
    fn test_composite_preserves_page_order_and_count() {
        let source = build_source(&[(612.0, 792.0), (612.0, 792.0), (612.0, 792.0)]);
        let overlay = test_overlay();

        let (composited, skipped) = composite_document(&source, &overlay);
        assert!(skipped.is_empty());
        assert_eq!(composited.len(), 3);
        let indices: Vec<usize> = composited.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_composited_pages_are_valid_single_page_documents() {
        let source = build_source(&[(612.0, 792.0), (595.0, 842.0)]);
        let overlay = test_overlay();

        let (composited, _) = composite_document(&source, &overlay);
        assert_eq!(composited.len(), 2);

        for page in &composited {
            let doc = Document::load_mem(&page.bytes).expect("round-tripped page must parse");
            assert_eq!(doc.get_pages().len(), 1);
        }
    }

    #[test]
    fn test_composite_preserves_page_dimensions() {
        let source = build_source(&[(595.0, 842.0)]);
        let overlay = test_overlay();

        let (composited, _) = composite_document(&source, &overlay);
        let doc = Document::load_mem(&composited[0].bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let Ok(Object::Dictionary(page)) = doc.get_object(page_id) else {
            panic!("page missing");
        };
        let Ok(Object::Array(media_box)) = page.get(b"MediaBox") else {
            panic!("MediaBox missing");
        };
        assert_eq!(as_number(&media_box[2]), 595.0);
        assert_eq!(as_number(&media_box[3]), 842.0);
    }

    #[test]
    fn test_overlay_content_layered_on_top_of_page_content() {
        let source = build_source(&[(612.0, 792.0)]);
        let overlay = test_overlay();

        let (composited, _) = composite_document(&source, &overlay);
        let doc = Document::load_mem(&composited[0].bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();

        // Original content comes first, overlay after it.
        let content = doc.get_page_content(page_id).unwrap();
        let text = String::from_utf8_lossy(&content);
        let original = text.find("(Page 1) Tj").expect("original content kept");
        let watermark = text.find("(TEST) Tj").expect("watermark content added");
        assert!(original < watermark);
    }

    #[test]
    fn test_overlay_resources_merged_into_page() {
        let source = build_source(&[(612.0, 792.0)]);
        let overlay = test_overlay();

        let (composited, _) = composite_document(&source, &overlay);
        let doc = Document::load_mem(&composited[0].bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let Ok(Object::Dictionary(page)) = doc.get_object(page_id) else {
            panic!("page missing");
        };
        let Ok(Object::Dictionary(resources)) = page.get(b"Resources") else {
            panic!("Resources missing");
        };
        // Both the page's own font and the overlay's additions survive.
        assert!(resources.has(b"Font"));
        assert!(resources.has(b"ExtGState"));
        let Ok(Object::Dictionary(fonts)) = resources.get(b"Font") else {
            panic!("Font missing");
        };
        // The page's own font is untouched; the overlay's font arrives
        // under its prefixed name.
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(b"WmF0"));
    }
}
