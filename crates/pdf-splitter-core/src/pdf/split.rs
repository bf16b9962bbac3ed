//! Page-by-page splitting into independent single-page PDFs.
//!
//! Each artifact is built from a whitelist: the page itself, every object
//! reachable from it, and a fresh page tree and catalog. Nothing else from
//! the source is copied, so one extraction costs the size of the page and
//! not the size of the document. Document metadata (Info, XMP, outlines)
//! lives on the source catalog and trailer and is never carried over.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use tracing::{debug, info};

use crate::error::{Error, Result};
use super::document::{PageBox, PdfDocument, page_box};
use super::page_index::PageIndex;

/// Page attributes that may be set on an ancestor in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// How each artifact is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitOptions {
    /// Deflate streams, drop empty streams and renumber objects
    pub compress: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// One single-page output document.
#[derive(Debug, Clone)]
pub struct SplitArtifact {
    /// 1-based position of the page in the source
    pub number: usize,
    /// Serialized PDF
    pub bytes: Vec<u8>,
}

impl SplitArtifact {
    /// Flat archive name, `1.pdf`, `2.pdf`, ...
    pub fn file_name(&self) -> String {
        format!("{}.pdf", self.number)
    }
}

/// Extract one zero-based page into a standalone PDF.
pub fn extract_page(document: &PdfDocument, page_num: usize, options: SplitOptions) -> Result<Vec<u8>> {
    let index = PageIndex::try_from_page_num(page_num, document.page_count())?;
    let source = document.structure();
    let page_id = document.page_id(index);

    let mut page = source
        .get_dictionary(page_id)
        .map_err(|e| Error::Lopdf(format!("page {}: {e}", index.artifact_number())))?
        .clone();
    inline_inherited(source, page_id, &mut page);
    page.remove(b"Parent");

    let keep = reachable(source, page_id, &page);

    let mut doc = Document::with_version(source.version.clone());
    doc.max_id = source.max_id;
    let pages_id = doc.new_object_id();

    for &id in &keep {
        if let Ok(object) = source.get_object(id) {
            let mut object = object.clone();
            detach(&mut object, &keep, page_id);
            doc.objects.insert(id, object);
        }
    }

    let mut page = Object::Dictionary(page);
    detach(&mut page, &keep, page_id);
    if let Object::Dictionary(dict) = &mut page {
        dict.set("Parent", Object::Reference(pages_id));
    }
    doc.objects.insert(page_id, page);

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    if options.compress {
        doc.delete_zero_length_streams();
        doc.renumber_objects();
        doc.compress();
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| Error::PdfSave(format!("page {}: {e}", index.artifact_number())))?;

    debug!(
        "Extracted page {} ({} objects, {} bytes)",
        index.artifact_number(),
        keep.len() + 3,
        output.len()
    );

    Ok(output)
}

/// Split every page of `document`, in order.
///
/// Either all pages succeed or the first failure is returned; no partial
/// result is ever handed back.
pub fn split(document: &PdfDocument, options: SplitOptions) -> Result<Vec<SplitArtifact>> {
    split_with_progress(document, options, |_, _| {})
}

/// [`split`], calling `on_page(done, total)` after each page.
pub fn split_with_progress(
    document: &PdfDocument,
    options: SplitOptions,
    mut on_page: impl FnMut(usize, usize),
) -> Result<Vec<SplitArtifact>> {
    let total = document.page_count();
    let mut artifacts = Vec::with_capacity(total);

    for page_num in 0..total {
        let bytes = extract_page(document, page_num, options)?;
        artifacts.push(SplitArtifact {
            number: page_num + 1,
            bytes,
        });
        on_page(page_num + 1, total);
    }

    info!("Split {} into {} pages", document.fingerprint(), artifacts.len());
    Ok(artifacts)
}

/// Parse raw bytes and split them. Parsing errors surface before any work.
pub fn split_bytes(bytes: &[u8], options: SplitOptions) -> Result<Vec<SplitArtifact>> {
    let document = PdfDocument::from_bytes(bytes.to_vec())?;
    split(&document, options)
}

/// Split into `dir` as `1.pdf` .. `N.pdf`.
///
/// All artifacts are built in memory before the first file is written.
pub fn split_to_dir(
    document: &PdfDocument,
    dir: impl AsRef<Path>,
    options: SplitOptions,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let artifacts = split(document, options)?;

    std::fs::create_dir_all(dir)?;
    artifacts
        .iter()
        .map(|artifact| {
            let path = dir.join(artifact.file_name());
            std::fs::write(&path, &artifact.bytes)?;
            Ok(path)
        })
        .collect()
}

/// Copy inherited attributes from the page tree onto the page itself.
fn inline_inherited(doc: &Document, page_id: ObjectId, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(id) = parent {
        if id == page_id {
            break;
        }
        let Ok(node) = doc.get_dictionary(id) else {
            break;
        };
        for key in INHERITABLE {
            if page.get(key).is_err()
                && let Ok(value) = node.get(key)
            {
                page.set(key, value.clone());
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}

/// Objects reachable from `page`, not following links into other pages or
/// the page tree.
fn reachable(doc: &Document, page_id: ObjectId, page: &Dictionary) -> BTreeSet<ObjectId> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<&Object> = page.iter().map(|(_, value)| value).collect();

    while let Some(object) = pending.pop() {
        match object {
            Object::Reference(id) => {
                if *id == page_id || seen.contains(id) {
                    continue;
                }
                let Ok(target) = doc.get_object(*id) else {
                    continue;
                };
                if matches!(target.type_name(), Ok(b"Page" | b"Pages")) {
                    continue;
                }
                seen.insert(*id);
                pending.push(target);
            }
            Object::Array(items) => pending.extend(items),
            Object::Dictionary(dict) => pending.extend(dict.iter().map(|(_, value)| value)),
            Object::Stream(stream) => pending.extend(stream.dict.iter().map(|(_, value)| value)),
            _ => {}
        }
    }

    seen
}

/// Null out references to objects that are not part of the artifact.
fn detach(object: &mut Object, keep: &BTreeSet<ObjectId>, page_id: ObjectId) {
    match object {
        Object::Reference(id) => {
            let id = *id;
            if id != page_id && !keep.contains(&id) {
                *object = Object::Null;
            }
        }
        Object::Array(items) => {
            for item in items {
                detach(item, keep, page_id);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                detach(value, keep, page_id);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                detach(value, keep, page_id);
            }
        }
        _ => {}
    }
}

// =============================================================================
// Reassembly
// =============================================================================

/// Combine single-page artifacts back into one document, in the order given.
///
/// Used to verify a split: the result must have the source's page count and
/// page sizes.
pub fn combine_pdfs(pages: &[Vec<u8>]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(Error::PdfSave("No pages to combine".to_string()));
    }

    let mut max_id: u32 = 1;
    let mut documents_pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut page_order: Vec<ObjectId> = Vec::with_capacity(pages.len());
    let mut documents_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut document = Document::with_version("1.5");

    for (i, page_bytes) in pages.iter().enumerate() {
        let mut doc = Document::load_mem(page_bytes)
            .map_err(|e| Error::Lopdf(format!("Failed to load page {}: {}", i + 1, e)))?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for &page_id in doc.get_pages().values() {
            // Resolve inherited MediaBox before the page leaves its tree
            let found = page_box(&doc, page_id);
            if let Ok(Object::Dictionary(dict)) = doc.get_object(page_id) {
                let mut dict = dict.clone();
                dict.set(
                    "MediaBox",
                    Object::Array(vec![
                        Object::Real(to_f32(found.x0)),
                        Object::Real(to_f32(found.y0)),
                        Object::Real(to_f32(found.x0 + found.width)),
                        Object::Real(to_f32(found.y0 + found.height)),
                    ]),
                );
                documents_pages.insert(page_id, Object::Dictionary(dict));
                page_order.push(page_id);
            }
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    documents_objects.insert(object_id, object);
                }
            }
        }
    }

    for (object_id, object) in documents_objects {
        document.objects.insert(object_id, object);
    }
    document.max_id = max_id;

    let pages_id = document.new_object_id();

    for (obj_id, object) in &documents_pages {
        if let Object::Dictionary(dict) = object {
            let mut new_dict = dict.clone();
            new_dict.set("Parent", Object::Reference(pages_id));
            document.objects.insert(*obj_id, Object::Dictionary(new_dict));
        }
    }

    let kids: Vec<Object> = page_order.iter().map(|&id| Object::Reference(id)).collect();

    #[allow(clippy::cast_possible_wrap)]
    let total_pages = kids.len() as i64;

    let pages_dict_obj = lopdf::Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(total_pages)),
    ]);
    document.objects.insert(pages_id, Object::Dictionary(pages_dict_obj));

    let catalog_id = document.new_object_id();
    let catalog_dict_obj = lopdf::Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    document.objects.insert(catalog_id, Object::Dictionary(catalog_dict_obj));

    document.trailer.set("Root", Object::Reference(catalog_id));

    document.renumber_objects();
    document.compress();

    let mut output = Vec::new();
    document.save_to(&mut output)
        .map_err(|e| Error::PdfSave(format!("Failed to save combined PDF: {e}")))?;

    Ok(output)
}

/// Check that artifacts reassemble into the source's page count and sizes.
pub fn verify_artifacts(source: &PdfDocument, artifacts: &[SplitArtifact]) -> Result<()> {
    let pages: Vec<Vec<u8>> = artifacts.iter().map(|a| a.bytes.clone()).collect();
    let combined = PdfDocument::from_bytes(combine_pdfs(&pages)?)?;

    if combined.page_count() != source.page_count() {
        return Err(Error::PdfSave(format!(
            "reassembled {} pages, source has {}",
            combined.page_count(),
            source.page_count()
        )));
    }

    for (i, (got, want)) in combined.page_boxes().iter().zip(source.page_boxes()).enumerate() {
        if !same_size(got, want) {
            return Err(Error::PdfSave(format!(
                "page {} is {}x{} after split, source is {}x{}",
                i + 1,
                got.width,
                got.height,
                want.width,
                want.height
            )));
        }
    }

    Ok(())
}

fn same_size(a: &PageBox, b: &PageBox) -> bool {
    (a.width - b.width).abs() < 0.01 && (a.height - b.height).abs() < 0.01
}

#[allow(clippy::cast_possible_truncation)]
const fn to_f32(value: f64) -> f32 {
    value as f32
}
