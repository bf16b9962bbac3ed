//! Mapping between preview pixels and page coordinates.
//!
//! The preview is a scaled raster of the page, so a point is mapped with
//! independent x and y scale factors. Both sides use a top-left origin.

use crate::error::{Error, Result};
use crate::pdf::{PageRenderer, PdfDocument};

/// Map a preview point to page coordinates.
///
/// Pure arithmetic: `preview_x * source_width / preview_width` and likewise
/// for y. No range checks are applied.
pub fn map_to_source(
    preview_x: f64,
    preview_y: f64,
    preview_width: f64,
    preview_height: f64,
    source_width: f64,
    source_height: f64,
) -> (f64, f64) {
    (
        preview_x * source_width / preview_width,
        preview_y * source_height / preview_height,
    )
}

/// A fixed preview/source size pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewMapping {
    pub preview_width: f64,
    pub preview_height: f64,
    pub source_width: f64,
    pub source_height: f64,
}

impl PreviewMapping {
    pub fn new(
        preview_width: f64,
        preview_height: f64,
        source_width: f64,
        source_height: f64,
    ) -> Result<Self> {
        for (field, value) in [
            ("preview_width", preview_width),
            ("preview_height", preview_height),
            ("source_width", source_width),
            ("source_height", source_height),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::ConfigInvalid {
                    field: field.to_string(),
                    reason: format!("must be positive, got {value}"),
                });
            }
        }

        Ok(Self {
            preview_width,
            preview_height,
            source_width,
            source_height,
        })
    }

    /// Mapping for a page rendered by [`PageRenderer`] at `scale`.
    ///
    /// Both sides describe the visible page: the preview raster as MuPDF
    /// sizes it, the source as the CropBox in points.
    pub fn for_page(document: &PdfDocument, page_num: usize, scale: f32) -> Result<Self> {
        let page = document.page_box(page_num)?;
        let preview = PageRenderer::with_scale(document, scale).pixel_size(page_num)?;
        Self::new(
            f64::from(preview.width),
            f64::from(preview.height),
            page.width,
            page.height,
        )
    }

    pub fn to_source(&self, x: f64, y: f64) -> (f64, f64) {
        map_to_source(
            x,
            y,
            self.preview_width,
            self.preview_height,
            self.source_width,
            self.source_height,
        )
    }

    pub fn to_preview(&self, x: f64, y: f64) -> (f64, f64) {
        map_to_source(
            x,
            y,
            self.source_width,
            self.source_height,
            self.preview_width,
            self.preview_height,
        )
    }
}
