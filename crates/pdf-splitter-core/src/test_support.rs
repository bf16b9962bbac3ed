//! Fixtures generated in code so unit tests need no files on disk.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

/// A PDF with `count` US Letter pages, each printing its page number.
pub fn pdf_with_pages(count: usize) -> Vec<u8> {
    pdf_with_sizes(&vec![(612.0, 792.0); count])
}

/// A PDF with one page per `(width, height)` entry and an Info dictionary.
pub fn pdf_with_sizes(sizes: &[(f32, f32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));

    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let mut kids = Vec::with_capacity(sizes.len());
    for (i, &(width, height)) in sizes.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 72.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", i + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_bytes = content.encode().unwrap_or_default();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

        let page_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(page_tree_id)),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Reference(resources_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), Object::Real(width), Object::Real(height)]),
            ),
        ]));
        kids.push(Object::Reference(page_id));
    }

    #[allow(clippy::cast_possible_wrap)]
    let count = kids.len() as i64;
    let page_tree = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(count)),
    ]);
    doc.objects.insert(page_tree_id, Object::Dictionary(page_tree));

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(page_tree_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let info_id = doc.add_object(Dictionary::from_iter([
        ("Title", Object::string_literal("Fixture")),
        ("Author", Object::string_literal("pdf-splitter tests")),
    ]));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut output = Vec::new();
    doc.save_to(&mut output).unwrap_or_default();
    output
}

/// One page whose `/Contents` is a reference to an array of two streams.
pub fn pdf_with_indirect_contents() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let first = doc.add_object(Stream::new(Dictionary::new(), text_content("First half")));
    let second = doc.add_object(Stream::new(Dictionary::new(), text_content("Second half")));
    let parts = doc.add_object(Object::Array(vec![
        Object::Reference(first),
        Object::Reference(second),
    ]));

    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(page_tree_id)),
        ("Contents", Object::Reference(parts)),
        ("MediaBox", Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()])),
    ]));

    finish(doc, page_tree_id, vec![Object::Reference(page_id)])
}

/// One US Letter page showing only the `[100 200 406 596]` CropBox.
pub fn pdf_with_crop_box() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let content_id = doc.add_object(Stream::new(Dictionary::new(), text_content("Cropped")));
    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(page_tree_id)),
        ("Contents", Object::Reference(content_id)),
        ("MediaBox", Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()])),
        ("CropBox", Object::Array(vec![100.into(), 200.into(), 406.into(), 596.into()])),
    ]));

    finish(doc, page_tree_id, vec![Object::Reference(page_id)])
}

/// `count` pages that inherit Resources and MediaBox from the page tree,
/// each carrying a link annotation to the next page.
pub fn pdf_with_links(count: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let page_tree_id = doc.new_object_id();

    let page_ids: Vec<_> = (0..count).map(|_| doc.new_object_id()).collect();
    for (i, &page_id) in page_ids.iter().enumerate() {
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            text_content(&format!("Page {}", i + 1)),
        ));
        let target = page_ids[(i + 1) % count];
        let link_id = doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Annot".to_vec())),
            ("Subtype", Object::Name(b"Link".to_vec())),
            ("Rect", Object::Array(vec![0.into(), 0.into(), 50.into(), 50.into()])),
            ("P", Object::Reference(page_id)),
            (
                "Dest",
                Object::Array(vec![Object::Reference(target), Object::Name(b"Fit".to_vec())]),
            ),
        ]));
        doc.objects.insert(
            page_id,
            Object::Dictionary(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(page_tree_id)),
                ("Contents", Object::Reference(content_id)),
                ("Annots", Object::Array(vec![Object::Reference(link_id)])),
            ])),
        );
    }

    let font_id = doc.add_object(helvetica());
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let kids = page_ids.into_iter().map(Object::Reference).collect();
    let mut bytes = Vec::new();
    let mut doc = tree(doc, page_tree_id, kids);
    if let Ok(node) = doc.get_object_mut(page_tree_id).and_then(Object::as_dict_mut) {
        node.set("Resources", Object::Reference(resources_id));
        node.set(
            "MediaBox",
            Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()]),
        );
    }
    doc.save_to(&mut bytes).unwrap_or_default();
    bytes
}

fn text_content(text: &str) -> Vec<u8> {
    Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 72.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    }
    .encode()
    .unwrap_or_default()
}

fn helvetica() -> Dictionary {
    Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ])
}

/// Attach the page tree and catalog.
fn tree(mut doc: Document, page_tree_id: lopdf::ObjectId, kids: Vec<Object>) -> Document {
    #[allow(clippy::cast_possible_wrap)]
    let count = kids.len() as i64;
    doc.objects.insert(
        page_tree_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(page_tree_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

fn finish(doc: Document, page_tree_id: lopdf::ObjectId, kids: Vec<Object>) -> Vec<u8> {
    let mut doc = tree(doc, page_tree_id, kids);
    let mut output = Vec::new();
    doc.save_to(&mut output).unwrap_or_default();
    output
}

/// A solid-colour PNG.
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap_or_default();
    out.into_inner()
}
