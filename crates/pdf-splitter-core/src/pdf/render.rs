use image::{ImageEncoder, RgbaImage};
use mupdf::{Colorspace, Matrix, Page};

use crate::error::{Error, Result};
use super::document::PdfDocument;
use super::page_index::PageIndex;

/// Rendered page dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

/// Default scale factor for previews (1.1, about 79 DPI)
pub const DEFAULT_PREVIEW_SCALE: f32 = 1.1;

/// Page renderer for PDF documents
pub struct PageRenderer<'a> {
    /// The PDF document to render
    pub doc: &'a PdfDocument,
    /// Scale factor for rendering
    pub scale: f32,
}

impl<'a> PageRenderer<'a> {
    /// Create a renderer with the default preview scale
    pub const fn new(doc: &'a PdfDocument) -> Self {
        Self {
            doc,
            scale: DEFAULT_PREVIEW_SCALE,
        }
    }

    /// Create a renderer with custom scale
    pub const fn with_scale(doc: &'a PdfDocument, scale: f32) -> Self {
        Self { doc, scale }
    }

    fn load_page(&self, page_num: usize) -> Result<Page> {
        let page_index = PageIndex::try_from_page_num(page_num, self.doc.page_count())?;

        let doc = self.doc.open_document()?;
        doc.load_page(page_index.into()).map_err(|e| {
            Error::PdfRender {
                page: page_num,
                reason: format!("Failed to load page: {e}"),
            }
        })
    }

    /// Render a page to an RGBA image buffer
    pub fn render_page(&self, page_num: usize) -> Result<RgbaImage> {
        let page = self.load_page(page_num)?;

        let matrix = Matrix::new_scale(self.scale, self.scale);

        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), 1.0, true)
            .map_err(|e| {
                Error::PdfRender {
                    page: page_num,
                    reason: format!("Failed to render: {e}"),
                }
            })?;

        let pixels = pixmap.samples();
        let img_width = pixmap.width();
        let img_height = pixmap.height();

        // mupdf hands back RGB, RGBA or gray depending on the pixmap
        let n = pixmap.n() as usize;
        let mut rgba_pixels = Vec::with_capacity((img_width * img_height * 4) as usize);

        for chunk in pixels.chunks(n) {
            match n {
                3 => {
                    rgba_pixels.extend_from_slice(chunk);
                    rgba_pixels.push(255);
                }
                4 => rgba_pixels.extend_from_slice(chunk),
                1 => {
                    rgba_pixels.extend_from_slice(&[chunk[0], chunk[0], chunk[0], 255]);
                }
                _ => {
                    return Err(Error::PdfRender {
                        page: page_num,
                        reason: format!("Unexpected pixel format with {n} components"),
                    });
                }
            }
        }

        RgbaImage::from_raw(img_width, img_height, rgba_pixels).ok_or_else(|| {
            Error::PdfRender {
                page: page_num,
                reason: "Failed to create image buffer".to_string(),
            }
        })
    }

    /// Raster size [`Self::render_page`] produces at the current scale,
    /// without rendering.
    ///
    /// MuPDF renders the visible page bounds and rounds the pixel box
    /// outwards, so 612pt at 1.1 is 674 pixels, not 673.
    pub fn pixel_size(&self, page_num: usize) -> Result<PixelSize> {
        let page = self.load_page(page_num)?;
        let bounds = page.bounds().map_err(|e| {
            Error::PdfRender {
                page: page_num,
                reason: format!("Failed to get bounds: {e}"),
            }
        })?;

        Ok(PixelSize {
            width: pixel_span(bounds.x0, bounds.x1, self.scale),
            height: pixel_span(bounds.y0, bounds.y1, self.scale),
        })
    }
}

/// Encode an RGBA image as PNG
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut png_data = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new_with_quality(
        &mut png_data,
        image::codecs::png::CompressionType::Fast,
        image::codecs::png::FilterType::Adaptive,
    );

    encoder
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| Error::PdfRender {
            page: 0,
            reason: format!("Failed to encode PNG: {e}"),
        })?;

    Ok(png_data)
}

/// Pixels covered by `[lo, hi]` scaled by `scale`, rounded outwards.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_span(lo: f32, hi: f32, scale: f32) -> u32 {
    const EPSILON: f32 = 0.001;
    let first = (lo * scale + EPSILON).floor();
    let last = (hi * scale - EPSILON).ceil();
    (last - first).max(0.0) as u32
}

/// Convert a non-negative dimension to u32, clamping to the valid range.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn f64_to_u32(value: f64) -> u32 {
    value.clamp(0.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{pdf_with_crop_box, pdf_with_sizes};

    #[test]
    fn test_pixel_size_scales_page() {
        let doc = PdfDocument::from_bytes(pdf_with_sizes(&[(600.0, 800.0)])).unwrap();
        let renderer = PageRenderer::with_scale(&doc, 0.75);
        let size = renderer.pixel_size(0).unwrap();
        assert_eq!(size, PixelSize { width: 450, height: 600 });
    }

    #[test]
    fn test_pixel_size_rounds_outwards() {
        assert_eq!(pixel_span(0.0, 612.0, 1.1), 674);
        assert_eq!(pixel_span(0.0, 600.0, 0.75), 450);
        assert_eq!(pixel_span(0.0, 792.0, 1.0), 792);
    }

    #[test]
    fn test_pixel_size_matches_render() {
        let doc = PdfDocument::from_bytes(pdf_with_sizes(&[(612.0, 792.0)])).unwrap();
        let renderer = PageRenderer::with_scale(&doc, 1.1);
        let size = renderer.pixel_size(0).unwrap();
        let img = renderer.render_page(0).unwrap();
        assert_eq!((size.width, size.height), img.dimensions());
        assert_eq!(size.width, 674);
    }

    #[test]
    fn test_cropped_page_renders_crop_box() {
        let doc = PdfDocument::from_bytes(pdf_with_crop_box()).unwrap();
        let renderer = PageRenderer::with_scale(&doc, 1.0);
        let size = renderer.pixel_size(0).unwrap();
        assert_eq!(size, PixelSize { width: 306, height: 396 });
        assert_eq!(renderer.render_page(0).unwrap().dimensions(), (306, 396));
    }

    #[test]
    fn test_render_page_matches_scale() {
        let doc = PdfDocument::from_bytes(pdf_with_sizes(&[(200.0, 100.0)])).unwrap();
        let img = PageRenderer::with_scale(&doc, 1.0).render_page(0).unwrap();
        assert_eq!(img.width(), 200);
        assert_eq!(img.height(), 100);
    }

    #[test]
    fn test_render_invalid_page() {
        let doc = PdfDocument::from_bytes(pdf_with_sizes(&[(200.0, 100.0)])).unwrap();
        let result = PageRenderer::new(&doc).render_page(3);
        assert!(matches!(result, Err(Error::PdfInvalidPage { .. })));
    }

    #[test]
    fn test_encode_png_magic() {
        let img = RgbaImage::new(4, 4);
        let png = encode_png(&img).unwrap();
        assert!(png.starts_with(&[0x89, 0x50, 0x4E, 0x47]));
    }
}
