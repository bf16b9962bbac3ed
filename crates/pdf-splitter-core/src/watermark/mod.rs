//! Watermark placement and compositing.
//!
//! Placement is resolved against the surface it is drawn on, so the same
//! [`Placement`] can be used for a low-resolution preview raster and for
//! the real PDF page. Coordinates are top-left based on both surfaces; the
//! PDF compositor converts to the bottom-left PDF origin when it writes the
//! content stream.

pub mod mapper;
mod pdf;
mod raster;

pub use mapper::{PreviewMapping, map_to_source};
pub use pdf::{composite_document, composite_pdf};
pub use raster::composite_raster;

use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{ImageFormat, ImageReader, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pdf::f64_to_u32;

/// A decoded watermark raster.
///
/// Never modified after loading; every placement resizes into a new buffer.
#[derive(Debug, Clone)]
pub struct Watermark {
    image: RgbaImage,
}

impl Watermark {
    /// Decode a PNG or JPEG watermark.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes)
            .map_err(|e| Error::WatermarkImage(format!("Unrecognized image data: {e}")))?;

        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(Error::WatermarkImage(format!(
                "{format:?} is not supported, use PNG or JPEG"
            )));
        }

        let image = ImageReader::with_format(Cursor::new(bytes), format)
            .decode()
            .map_err(|e| Error::WatermarkImage(format!("Failed to decode {format:?}: {e}")))?
            .into_rgba8();

        if image.width() == 0 || image.height() == 0 {
            return Err(Error::WatermarkImage("Image has no pixels".to_string()));
        }

        Ok(Self { image })
    }

    /// Read and decode a watermark file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            Error::WatermarkImage(format!("Failed to read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Wrap an already decoded image
    pub const fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Resolve `placement` against a destination of the given size.
    pub fn geometry(&self, placement: &Placement, dest_width: f64, dest_height: f64) -> PlacementGeometry {
        placement.resolve(self.width(), self.height(), dest_width, dest_height)
    }

    /// Resize into a new buffer matching `geometry` and apply its opacity to alpha.
    pub fn prepared(&self, geometry: &PlacementGeometry) -> RgbaImage {
        let (width, height) = geometry.pixel_size();
        let mut resized = image::imageops::resize(&self.image, width, height, FilterType::Lanczos3);

        if geometry.opacity < 1.0 {
            for pixel in resized.pixels_mut() {
                pixel[3] = scale_alpha(pixel[3], geometry.opacity);
            }
        }

        resized
    }
}

/// Where and how large to draw the watermark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Top-left offset in destination units; size is the native pixel size times `scale`.
    Absolute {
        x: f64,
        y: f64,
        scale: f64,
        opacity: f64,
    },
    /// Fractional position inside the free space (destination minus watermark);
    /// width is `scale` times the destination width, aspect preserved.
    Ratio {
        x_ratio: f64,
        y_ratio: f64,
        scale: f64,
        opacity: f64,
    },
}

impl Placement {
    pub const fn absolute(x: f64, y: f64, scale: f64) -> Self {
        Self::Absolute {
            x,
            y,
            scale,
            opacity: 1.0,
        }
    }

    pub const fn ratio(x_ratio: f64, y_ratio: f64, scale: f64) -> Self {
        Self::Ratio {
            x_ratio,
            y_ratio,
            scale,
            opacity: 1.0,
        }
    }

    #[must_use]
    pub const fn with_opacity(self, value: f64) -> Self {
        match self {
            Self::Absolute { x, y, scale, .. } => Self::Absolute {
                x,
                y,
                scale,
                opacity: value,
            },
            Self::Ratio {
                x_ratio,
                y_ratio,
                scale,
                ..
            } => Self::Ratio {
                x_ratio,
                y_ratio,
                scale,
                opacity: value,
            },
        }
    }

    pub const fn opacity(&self) -> f64 {
        match self {
            Self::Absolute { opacity, .. } | Self::Ratio { opacity, .. } => *opacity,
        }
    }

    /// Reject parameters outside their documented ranges.
    pub fn validate(&self) -> Result<()> {
        let (scale, opacity) = match *self {
            Self::Absolute { x, y, scale, opacity } => {
                check_finite("x", x)?;
                check_finite("y", y)?;
                (scale, opacity)
            }
            Self::Ratio {
                x_ratio,
                y_ratio,
                scale,
                opacity,
            } => {
                check_unit("x_ratio", x_ratio)?;
                check_unit("y_ratio", y_ratio)?;
                (scale, opacity)
            }
        };

        if !(scale.is_finite() && scale > 0.0) {
            return Err(invalid("scale", format!("must be positive, got {scale}")));
        }
        check_unit("opacity", opacity)
    }

    /// Compute geometry for a watermark of `wm_width`×`wm_height` pixels on a
    /// destination of `dest_width`×`dest_height` units.
    ///
    /// Offsets that would push the watermark outside the destination are
    /// clamped to the nearest valid offset.
    pub fn resolve(&self, wm_width: u32, wm_height: u32, dest_width: f64, dest_height: f64) -> PlacementGeometry {
        let (wm_w, wm_h) = (f64::from(wm_width.max(1)), f64::from(wm_height.max(1)));

        let (x, y, width, height) = match *self {
            Self::Absolute { x, y, scale, .. } => {
                let width = (wm_w * scale).floor().max(1.0);
                let height = (wm_h * scale).floor().max(1.0);
                (x, y, width, height)
            }
            Self::Ratio {
                x_ratio,
                y_ratio,
                scale,
                ..
            } => {
                let width = (dest_width * scale).max(1.0);
                let height = (width * wm_h / wm_w).max(1.0);
                let free_w = (dest_width - width).max(0.0);
                let free_h = (dest_height - height).max(0.0);
                (
                    x_ratio.clamp(0.0, 1.0) * free_w,
                    y_ratio.clamp(0.0, 1.0) * free_h,
                    width,
                    height,
                )
            }
        };

        let max_x = (dest_width - width).max(0.0);
        let max_y = (dest_height - height).max(0.0);
        let clamped_x = x.clamp(0.0, max_x);
        let clamped_y = y.clamp(0.0, max_y);

        if (clamped_x - x).abs() > f64::EPSILON || (clamped_y - y).abs() > f64::EPSILON {
            debug!(
                "Clamped watermark offset ({:.1}, {:.1}) to ({:.1}, {:.1}) on {:.1}x{:.1}",
                x, y, clamped_x, clamped_y, dest_width, dest_height
            );
        }

        PlacementGeometry {
            x: clamped_x,
            y: clamped_y,
            width,
            height,
            opacity: self.opacity().clamp(0.0, 1.0),
        }
    }
}

/// Resolved placement on one surface. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementGeometry {
    /// Left edge, from the left of the surface
    pub x: f64,
    /// Top edge, from the top of the surface
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub opacity: f64,
}

impl PlacementGeometry {
    /// Size of the raster drawn for this geometry, at least one pixel each way.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            f64_to_u32(self.width.round()).max(1),
            f64_to_u32(self.height.round()).max(1),
        )
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_alpha(alpha: u8, opacity: f64) -> u8 {
    (f64::from(alpha) * opacity.clamp(0.0, 1.0)).round() as u8
}

fn invalid(field: &str, reason: String) -> Error {
    Error::ConfigInvalid {
        field: field.to_string(),
        reason,
    }
}

fn check_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("must be a finite number, got {value}")))
    }
}

fn check_unit(field: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("must be between 0 and 1, got {value}")))
    }
}
