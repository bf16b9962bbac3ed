use image::RgbaImage;
use image::imageops::overlay;

use super::{Placement, Watermark};

/// Draw the watermark over a copy of `preview`.
///
/// Placement is resolved in preview pixels, so the same [`Placement`] gives a
/// proportionally matching position on the real page when it is a ratio.
#[allow(clippy::cast_possible_truncation)]
pub fn composite_raster(preview: &RgbaImage, watermark: &Watermark, placement: &Placement) -> RgbaImage {
    let geometry = watermark.geometry(
        placement,
        f64::from(preview.width()),
        f64::from(preview.height()),
    );
    let stamp = watermark.prepared(&geometry);

    let mut canvas = preview.clone();
    overlay(
        &mut canvas,
        &stamp,
        geometry.x.round() as i64,
        geometry.y.round() as i64,
    );
    canvas
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::test_support::png_bytes;

    #[test]
    fn test_overlay_position() {
        let preview = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let wm = Watermark::from_bytes(&png_bytes(10, 10, [255, 0, 0, 255])).unwrap();

        let out = composite_raster(&preview, &wm, &Placement::absolute(20.0, 30.0, 1.0));

        assert_eq!(out.get_pixel(25, 35), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(19, 35), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(25, 40), &Rgba([255, 255, 255, 255]));
        // Preview itself is untouched
        assert_eq!(preview.get_pixel(25, 35), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_transparent_watermark_keeps_background() {
        let preview = RgbaImage::from_pixel(50, 50, Rgba([0, 255, 0, 255]));
        let wm = Watermark::from_bytes(&png_bytes(10, 10, [255, 0, 0, 0])).unwrap();

        let out = composite_raster(&preview, &wm, &Placement::absolute(0.0, 0.0, 1.0));
        assert_eq!(out.get_pixel(5, 5), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_clamped_at_edge() {
        let preview = RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]));
        let wm = Watermark::from_bytes(&png_bytes(10, 10, [0, 0, 0, 255])).unwrap();

        let out = composite_raster(&preview, &wm, &Placement::absolute(100.0, 100.0, 1.0));
        assert_eq!(out.get_pixel(39, 39), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(29, 29), &Rgba([255, 255, 255, 255]));
    }
}
