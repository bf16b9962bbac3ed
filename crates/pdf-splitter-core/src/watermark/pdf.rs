//! Stamping a watermark onto every page of a PDF.
//!
//! The raster is embedded as an RGB image XObject with a DeviceGray soft
//! mask carrying its alpha. Pages that resolve to the same pixel size share
//! one embedded image. Existing page content is wrapped in `q`/`Q` so its
//! graphics state cannot leak into the watermark draw.

use std::collections::HashMap;
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::RgbaImage;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info};

use super::{Placement, PlacementGeometry, Watermark};
use crate::config::PlacementPolicy;
use crate::error::{Error, Result};
use crate::pdf::{PageBox, PdfDocument};

const XOBJECT_PREFIX: &str = "PsWm";

/// Composite `watermark` onto `document` and return the serialized PDF.
///
/// With [`PlacementPolicy::PerPage`] the placement is resolved against each
/// page's own size; with [`PlacementPolicy::FirstPage`] the first page's
/// geometry is reused everywhere. The source document is not modified.
pub fn composite_pdf(
    document: &PdfDocument,
    watermark: &Watermark,
    placement: &Placement,
    policy: PlacementPolicy,
) -> Result<Vec<u8>> {
    placement.validate()?;

    let mut doc = document.structure().clone();
    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    let boxes = document.page_boxes();

    let first = boxes
        .first()
        .map(|page| watermark.geometry(placement, page.width, page.height))
        .ok_or_else(|| Error::PdfOpen("Document has no pages".to_string()))?;

    let mut embedded: HashMap<(u32, u32), ObjectId> = HashMap::new();

    for (page_num, (&page_id, page)) in page_ids.iter().zip(boxes).enumerate() {
        let geometry = match policy {
            PlacementPolicy::PerPage => watermark.geometry(placement, page.width, page.height),
            PlacementPolicy::FirstPage => first,
        };

        let image_id = match embedded.get(&geometry.pixel_size()) {
            Some(&id) => id,
            None => {
                let id = embed_image(&mut doc, &watermark.prepared(&geometry))
                    .map_err(|reason| Error::Watermark { page: page_num, reason })?;
                embedded.insert(geometry.pixel_size(), id);
                id
            }
        };

        stamp_page(&mut doc, page_id, image_id, &geometry, page)
            .map_err(|reason| Error::Watermark { page: page_num, reason })?;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| Error::PdfSave(format!("Failed to save watermarked PDF: {e}")))?;

    info!(
        "Watermarked {} pages ({} embedded image{})",
        page_ids.len(),
        embedded.len(),
        if embedded.len() == 1 { "" } else { "s" }
    );

    Ok(output)
}

/// Same as [`composite_pdf`], re-parsed for further processing.
pub fn composite_document(
    document: &PdfDocument,
    watermark: &Watermark,
    placement: &Placement,
    policy: PlacementPolicy,
) -> Result<PdfDocument> {
    PdfDocument::from_bytes(composite_pdf(document, watermark, placement, policy)?)
}

/// Add the image and its soft mask to the document, returning the image id.
fn embed_image(doc: &mut Document, image: &RgbaImage) -> std::result::Result<ObjectId, String> {
    let (width, height) = image.dimensions();
    let pixels = (width as usize) * (height as usize);

    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = Vec::with_capacity(pixels);
    for pixel in image.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel[3]);
    }

    let smask_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
        },
        deflate(&alpha)?,
    ));

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
            "SMask" => Object::Reference(smask_id),
        },
        deflate(&rgb)?,
    ));

    debug!("Embedded {}x{} watermark as {:?}", width, height, image_id);
    Ok(image_id)
}

fn deflate(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| format!("Failed to deflate image data: {e}"))?;
    encoder
        .finish()
        .map_err(|e| format!("Failed to deflate image data: {e}"))
}

/// Register the image on the page and draw it at `geometry`.
fn stamp_page(
    doc: &mut Document,
    page_id: ObjectId,
    image_id: ObjectId,
    geometry: &PlacementGeometry,
    page: &PageBox,
) -> std::result::Result<(), String> {
    // Resources may be shared with other pages, so the page gets its own copy
    let mut resources = inherited_resources(doc, page_id);
    let mut xobjects = resolve_dict(doc, resources.get(b"XObject").ok());
    let name = free_name(&xobjects);
    xobjects.set(name.clone(), Object::Reference(image_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let existing = content_parts(doc, page_id)?;

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let stamp_id = doc.add_object(Stream::new(
        Dictionary::new(),
        draw_operations(&name, geometry, page).into_bytes(),
    ));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(stamp_id));

    let page_dict = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| format!("Page dictionary missing: {e}"))?;
    page_dict.set("Resources", Object::Dictionary(resources));
    page_dict.set("Contents", Object::Array(contents));

    Ok(())
}

/// The page's content streams as a flat list of stream references.
///
/// `/Contents` may be a single stream, an array of streams, or a reference
/// to either; an indirect array is spliced in element by element.
fn content_parts(doc: &Document, page_id: ObjectId) -> std::result::Result<Vec<Object>, String> {
    let contents = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| format!("Page dictionary missing: {e}"))?
        .get(b"Contents")
        .ok();

    Ok(match contents {
        None => Vec::new(),
        Some(Object::Array(parts)) => parts.clone(),
        Some(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(parts)) => parts.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Some(other) => vec![other.clone()],
    })
}

/// Content stream closing the wrapped page content and drawing the image.
///
/// `geometry` is top-left based on the visible page; PDF user space grows
/// upwards and the visible box may not start at the origin.
fn draw_operations(name: &str, geometry: &PlacementGeometry, page: &PageBox) -> String {
    let x = page.x0 + geometry.x;
    let y = page.y0 + page.height - geometry.y - geometry.height;
    format!(
        "Q\nq {:.3} 0 0 {:.3} {:.3} {:.3} cm /{} Do Q\n",
        geometry.width, geometry.height, x, y, name
    )
}

/// The page's Resources dictionary, inherited from the page tree if needed.
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };
        if let Ok(found) = dict.get(b"Resources") {
            return resolve_dict(doc, Some(found));
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Dictionary::new()
}

/// Copy a dictionary that may be stored inline or behind a reference.
fn resolve_dict(doc: &Document, object: Option<&Object>) -> Dictionary {
    match object {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_dict)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    }
}

fn free_name(xobjects: &Dictionary) -> String {
    (0..)
        .map(|n| format!("{XOBJECT_PREFIX}{n}"))
        .find(|name| xobjects.get(name.as_bytes()).is_err())
        .unwrap_or_else(|| XOBJECT_PREFIX.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{
        pdf_with_crop_box, pdf_with_indirect_contents, pdf_with_pages, pdf_with_sizes, png_bytes,
    };

    fn page_text(bytes: &[u8], page: u32) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = *doc.get_pages().get(&page).unwrap();
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
    }

    #[test]
    fn test_draws_at_converted_origin() {
        let doc = PdfDocument::from_bytes(pdf_with_pages(1)).unwrap();
        let wm = Watermark::from_bytes(&png_bytes(200, 100, [0, 0, 255, 255])).unwrap();
        let placement = Placement::absolute(100.0, 100.0, 0.5);

        let out = composite_pdf(&doc, &wm, &placement, PlacementPolicy::PerPage).unwrap();
        let text = page_text(&out, 1);

        assert!(text.contains("100.000 0 0 50.000 100.000 642.000 cm"), "{text}");
        assert!(text.contains("Page 1"));
    }

    #[test]
    fn test_anchored_to_crop_box() {
        let doc = PdfDocument::from_bytes(pdf_with_crop_box()).unwrap();
        let wm = Watermark::from_bytes(&png_bytes(10, 10, [0, 0, 0, 255])).unwrap();
        let out = composite_pdf(&doc, &wm, &Placement::absolute(0.0, 0.0, 1.0), PlacementPolicy::PerPage)
            .unwrap();

        let text = page_text(&out, 1);
        assert!(text.contains("10.000 0 0 10.000 100.000 586.000 cm"), "{text}");
    }

    #[test]
    fn test_indirect_contents_array_keeps_page_text() {
        let doc = PdfDocument::from_bytes(pdf_with_indirect_contents()).unwrap();
        let wm = Watermark::from_bytes(&png_bytes(10, 10, [0, 0, 0, 255])).unwrap();
        let out = composite_pdf(&doc, &wm, &Placement::absolute(0.0, 0.0, 1.0), PlacementPolicy::PerPage)
            .unwrap();

        let parsed = Document::load_mem(&out).unwrap();
        let page_id = *parsed.get_pages().get(&1).unwrap();
        let contents = parsed
            .get_object(page_id)
            .and_then(Object::as_dict)
            .and_then(|d| d.get(b"Contents"))
            .and_then(Object::as_array)
            .unwrap();
        for part in contents {
            let id = part.as_reference().unwrap();
            assert!(parsed.get_object(id).and_then(Object::as_stream).is_ok());
        }

        let text = page_text(&out, 1);
        assert!(text.contains("First half"), "{text}");
        assert!(text.contains("Second half"), "{text}");
        assert!(text.contains("Do Q"), "{text}");
    }

    #[test]
    fn test_every_page_is_stamped() {
        let doc = PdfDocument::from_bytes(pdf_with_pages(3)).unwrap();
        let wm = Watermark::from_bytes(&png_bytes(10, 10, [0, 0, 0, 128])).unwrap();
        let out = composite_pdf(&doc, &wm, &Placement::ratio(0.5, 0.5, 0.2), PlacementPolicy::PerPage)
            .unwrap();

        for page in 1..=3 {
            assert!(page_text(&out, page).contains("Do Q"));
        }
    }

    #[test]
    fn test_same_size_pages_share_image() {
        let doc = PdfDocument::from_bytes(pdf_with_pages(3)).unwrap();
        let wm = Watermark::from_bytes(&png_bytes(10, 10, [0, 0, 0, 255])).unwrap();
        let out = composite_pdf(&doc, &wm, &Placement::absolute(0.0, 0.0, 1.0), PlacementPolicy::PerPage)
            .unwrap();

        let parsed = Document::load_mem(&out).unwrap();
        let images = parsed
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| s.dict.get(b"ColorSpace").and_then(Object::as_name).ok() == Some(b"DeviceRGB".as_slice()))
            .count();
        assert_eq!(images, 1);
    }

    #[test]
    fn test_policy_changes_geometry_on_mixed_sizes() {
        let doc = PdfDocument::from_bytes(pdf_with_sizes(&[(600.0, 800.0), (300.0, 400.0)])).unwrap();
        let wm = Watermark::from_bytes(&png_bytes(100, 100, [0, 0, 0, 255])).unwrap();
        let placement = Placement::ratio(0.0, 0.0, 0.5);

        let per_page = composite_pdf(&doc, &wm, &placement, PlacementPolicy::PerPage).unwrap();
        let first_only = composite_pdf(&doc, &wm, &placement, PlacementPolicy::FirstPage).unwrap();

        assert!(page_text(&per_page, 2).contains("150.000 0 0 150.000"));
        assert!(page_text(&first_only, 2).contains("300.000 0 0 300.000"));
    }

    #[test]
    fn test_source_document_unchanged() {
        let doc = PdfDocument::from_bytes(pdf_with_pages(1)).unwrap();
        let before = doc.bytes().to_vec();
        let wm = Watermark::from_bytes(&png_bytes(4, 4, [1, 2, 3, 255])).unwrap();
        let _ = composite_pdf(&doc, &wm, &Placement::absolute(0.0, 0.0, 1.0), PlacementPolicy::PerPage)
            .unwrap();
        assert_eq!(doc.bytes(), before.as_slice());
    }

    #[test]
    fn test_free_name_skips_taken() {
        let mut dict = Dictionary::new();
        dict.set("PsWm0", Object::Null);
        assert_eq!(free_name(&dict), "PsWm1");
    }
}
