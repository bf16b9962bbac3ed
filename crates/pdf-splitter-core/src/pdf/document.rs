use std::path::Path;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId};
use mupdf::Document as MuDocument;

use crate::error::{Error, Result};
use super::page_index::PageIndex;

/// Fallback page box when a page and its ancestors carry no MediaBox (US Letter)
const DEFAULT_PAGE_BOX: PageBox = PageBox {
    x0: 0.0,
    y0: 0.0,
    width: 612.0,
    height: 792.0,
};

/// Visible page extent in PDF user-space units.
///
/// This is the CropBox clipped to the MediaBox, or the MediaBox when no
/// CropBox is set. `x0`/`y0` is its lower-left corner, which is not always
/// the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub x0: f64,
    pub y0: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    fn intersect(&self, other: &Self) -> Option<Self> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = (self.x0 + self.width).min(other.x0 + other.width);
        let y1 = (self.y0 + self.height).min(other.y0 + other.height);
        (x1 > x0 && y1 > y0).then(|| Self {
            x0,
            y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// A loaded source document, immutable once parsed.
pub struct PdfDocument {
    /// The raw PDF bytes (kept for rendering and remote compression)
    bytes: Arc<Vec<u8>>,
    /// Parsed structure, shared by every page extraction
    parsed: Arc<Document>,
    /// Page boxes in page order
    pages: Vec<PageBox>,
    /// Page object ids in page order
    page_ids: Vec<ObjectId>,
    /// MD5 hex of the bytes, computed once on load
    fingerprint: String,
}

impl PdfDocument {
    /// Parse a PDF from bytes.
    ///
    /// Fails with [`Error::PdfOpen`] for anything lopdf cannot read or for a
    /// document without pages.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();

        let parsed = Document::load_mem(&bytes)
            .map_err(|e| Error::PdfOpen(format!("Failed to parse PDF: {e}")))?;

        let page_ids: Vec<ObjectId> = parsed.get_pages().into_values().collect();
        let pages = page_ids
            .iter()
            .map(|&page_id| page_box(&parsed, page_id))
            .collect::<Vec<_>>();

        if pages.is_empty() {
            return Err(Error::PdfOpen("Document has no pages".to_string()));
        }

        let fingerprint = format!("{:x}", md5::compute(&bytes));

        Ok(Self {
            bytes: Arc::new(bytes),
            parsed: Arc::new(parsed),
            pages,
            page_ids,
            fingerprint,
        })
    }

    /// Open a PDF from a file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            Error::PdfOpen(format!("Failed to read file {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_bytes(bytes)
    }

    /// Get number of pages
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page box of a zero-based page.
    pub fn page_box(&self, page_num: usize) -> Result<PageBox> {
        let index = PageIndex::try_from_page_num(page_num, self.page_count())?;
        Ok(self.pages[index.as_usize()])
    }

    /// All page boxes in page order.
    pub fn page_boxes(&self) -> &[PageBox] {
        &self.pages
    }

    /// Object id of a validated page.
    pub(crate) fn page_id(&self, index: PageIndex) -> ObjectId {
        self.page_ids[index.as_usize()]
    }

    /// Get raw PDF bytes as a slice.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parsed lopdf structure. Callers clone it before mutating.
    pub(crate) fn structure(&self) -> &Document {
        &self.parsed
    }

    /// Open the document in MuPDF for rendering (creates a temporary handle)
    pub(crate) fn open_document(&self) -> Result<MuDocument> {
        MuDocument::from_bytes(&self.bytes, "")
            .map_err(|e| Error::PdfOpen(format!("Failed to open document: {e}")))
    }

    /// MD5 hash of the PDF bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl Clone for PdfDocument {
    /// O(1): bytes and parsed structure are shared.
    fn clone(&self) -> Self {
        Self {
            bytes: Arc::clone(&self.bytes),
            parsed: Arc::clone(&self.parsed),
            pages: self.pages.clone(),
            page_ids: self.page_ids.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("page_count", &self.pages.len())
            .field("fingerprint", &self.fingerprint)
            .field("bytes_len", &self.bytes.len())
            .finish()
    }
}

/// Resolve the visible box of a page, walking up the page tree for
/// inherited MediaBox and CropBox values.
pub(crate) fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let media = inherited_box(doc, page_id, b"MediaBox").unwrap_or(DEFAULT_PAGE_BOX);
    inherited_box(doc, page_id, b"CropBox")
        .and_then(|crop| crop.intersect(&media))
        .unwrap_or(media)
}

fn inherited_box(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<PageBox> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };
        if let Some(found) = rectangle(doc, dict, key) {
            return Some(found);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn rectangle(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<PageBox> {
    let raw = dict.get(key).ok()?;
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let llx = obj_to_f64(&arr[0])?;
    let lly = obj_to_f64(&arr[1])?;
    let urx = obj_to_f64(&arr[2])?;
    let ury = obj_to_f64(&arr[3])?;
    Some(PageBox {
        x0: llx.min(urx),
        y0: lly.min(ury),
        width: (urx - llx).abs(),
        height: (ury - lly).abs(),
    })
}

#[allow(clippy::cast_precision_loss)]
fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{pdf_with_crop_box, pdf_with_pages, pdf_with_sizes};

    #[test]
    fn test_page_count_and_sizes() {
        let doc = PdfDocument::from_bytes(pdf_with_sizes(&[(612.0, 792.0), (842.0, 595.0)])).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert!((doc.page_box(0).unwrap().width - 612.0).abs() < 1e-6);
        assert!((doc.page_box(1).unwrap().height - 595.0).abs() < 1e-6);
        assert!(doc.page_box(2).is_err());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let bytes = pdf_with_pages(3);
        let a = PdfDocument::from_bytes(bytes.clone()).unwrap();
        let b = PdfDocument::from_bytes(bytes).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 32);
    }

    #[test]
    fn test_clone_shares_bytes() {
        let doc = PdfDocument::from_bytes(pdf_with_pages(1)).unwrap();
        let copy = doc.clone();
        assert_eq!(doc.bytes().as_ptr(), copy.bytes().as_ptr());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            PdfDocument::from_bytes(b"not a pdf".to_vec()),
            Err(Error::PdfOpen(_))
        ));
        assert!(matches!(PdfDocument::from_bytes(Vec::new()), Err(Error::PdfOpen(_))));
    }

    #[test]
    fn test_crop_box_is_the_visible_box() {
        let doc = PdfDocument::from_bytes(pdf_with_crop_box()).unwrap();
        let page = doc.page_box(0).unwrap();
        assert_eq!(
            page,
            PageBox {
                x0: 100.0,
                y0: 200.0,
                width: 306.0,
                height: 396.0,
            }
        );
    }

    #[test]
    fn test_crop_box_is_clipped_to_media_box() {
        let media = PageBox {
            x0: 0.0,
            y0: 0.0,
            width: 612.0,
            height: 792.0,
        };
        let crop = PageBox {
            x0: 500.0,
            y0: -100.0,
            width: 300.0,
            height: 300.0,
        };
        let visible = crop.intersect(&media).unwrap();
        assert_eq!((visible.x0, visible.y0, visible.width, visible.height), (500.0, 0.0, 112.0, 200.0));

        let outside = PageBox { x0: 700.0, ..crop };
        assert!(outside.intersect(&media).is_none());
    }

    #[test]
    fn test_inherited_media_box() {
        // Pages without their own MediaBox inherit it from the page tree
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(lopdf::dictionary! {
                "Type" => "Pages",
                "Kids" => Object::Array(vec![Object::Reference(page_id)]),
                "Count" => 1,
                "MediaBox" => Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()]),
            }),
        );
        let found = page_box(&doc, page_id);
        assert!((found.width - 595.0).abs() < 1e-6);
        assert!((found.height - 842.0).abs() < 1e-6);
    }
}
