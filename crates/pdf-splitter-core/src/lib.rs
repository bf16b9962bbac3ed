//! PDF Splitter Core Library
//!
//! Turns one PDF into a ZIP of single-page PDFs:
//! - Optional image watermark stamped on every page
//! - Optional whole-document compression through a remote service
//! - Page-by-page splitting with metadata stripped and streams deflated
//! - Flat ZIP packaging (`1.pdf` .. `N.pdf`)
//!
//! The [`Pipeline`] drives a full run; the individual steps are available
//! on their own in [`pdf`], [`watermark`], [`compress`] and [`archive`].

pub mod archive;
pub mod compress;
pub mod config;
pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod util;
pub mod watermark;
pub mod workdir;

#[cfg(test)]
mod test_support;

pub use archive::{ArchiveBundle, package, package_artifacts};
pub use compress::{Compressor, CompressorInfo, DirectCompressor, LinkCompressor, create_compressor};
pub use config::{
    AppConfig, CompressionConfig, CompressionMode, PlacementPolicy, PlacementPreset, Quality,
    RemoteFlavor,
};
pub use error::{Error, Result};
pub use pdf::{
    PageBox, PageRenderer, PdfDocument, SplitArtifact, SplitOptions, split, split_to_dir,
    split_with_progress,
};
pub use pipeline::{
    Pipeline, PipelineOptions, Progress, ProgressFn, RunReport, WatermarkSpec, render_preview,
    render_preview_png,
};
pub use watermark::{
    Placement, PlacementGeometry, PreviewMapping, Watermark, composite_pdf, composite_raster,
    map_to_source,
};
pub use workdir::WorkingDir;
