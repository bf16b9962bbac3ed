mod document;
mod page_index;
mod render;
pub mod split;

pub use document::{PageBox, PdfDocument};
pub use page_index::PageIndex;
pub use render::{DEFAULT_PREVIEW_SCALE, PageRenderer, PixelSize, encode_png};
pub use split::{
    SplitArtifact, SplitOptions, combine_pdfs, extract_page, split, split_bytes, split_to_dir,
    split_with_progress, verify_artifacts,
};

pub(crate) use render::f64_to_u32;
