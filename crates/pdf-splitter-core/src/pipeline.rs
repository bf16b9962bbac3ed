//! End-to-end processing of one document.
//!
//! A run loads the source, optionally stamps the watermark on every page,
//! optionally sends the whole document through a remote compressor, splits
//! it into single-page PDFs and zips them. CPU-bound steps run on the
//! blocking pool; only the remote call is awaited on the runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archive::{ArchiveBundle, package};
use crate::compress::{Compressor, create_compressor};
use crate::config::{AppConfig, CompressionMode, PlacementPolicy, PlacementPreset};
use crate::error::{Error, Result};
use crate::pdf::{
    PageRenderer, PdfDocument, SplitArtifact, SplitOptions, encode_png, split_with_progress,
    verify_artifacts,
};
use crate::util::{default_work_root, format_size};
use crate::watermark::{Placement, PreviewMapping, Watermark, composite_document, composite_raster};
use crate::workdir::WorkingDir;

/// Watermark image plus where to put it.
#[derive(Debug, Clone)]
pub struct WatermarkSpec {
    pub image: Watermark,
    /// Placement in page units (top-left origin)
    pub placement: Placement,
}

impl WatermarkSpec {
    pub const fn new(image: Watermark, placement: Placement) -> Self {
        Self { image, placement }
    }

    /// Absolute placement from a point picked on the page-1 preview.
    ///
    /// The preview is page 1 rendered at `preview_scale`; the point is mapped
    /// back to page units before it is stored.
    pub fn from_preview(
        image: Watermark,
        document: &PdfDocument,
        preview_x: f64,
        preview_y: f64,
        scale: f64,
        preview_scale: f32,
    ) -> Result<Self> {
        let mapping = PreviewMapping::for_page(document, 0, preview_scale)?;
        let (x, y) = mapping.to_source(preview_x, preview_y);
        debug!(
            "Preview point ({:.1}, {:.1}) maps to ({:.1}, {:.1}) on page 1",
            preview_x, preview_y, x, y
        );
        Ok(Self::new(image, Placement::absolute(x, y, scale)))
    }

    /// Placement from one of the built-in layouts.
    pub fn from_preset(
        image: Watermark,
        document: &PdfDocument,
        preset: PlacementPreset,
        preview_scale: f32,
    ) -> Result<Self> {
        let (x, y) = preset.preview_position();
        Self::from_preview(image, document, x, y, preset.scale(), preview_scale)
    }
}

/// What a run does, independent of where its input comes from.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub watermark: Option<WatermarkSpec>,
    pub compression: CompressionMode,
    pub placement_policy: PlacementPolicy,
    /// Reassemble the artifacts and compare page count and sizes before packaging
    pub verify: bool,
}

/// Stage notifications for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Loaded { pages: usize },
    Watermarked,
    RemoteCompression { applied: bool },
    PageSplit { done: usize, total: usize },
    Packaged { entries: usize },
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub archive: ArchiveBundle,
    pub page_count: usize,
    pub watermarked: bool,
    pub remote_compressed: bool,
    pub input_size: usize,
    /// Set when the working directory was kept on disk
    pub work_dir: Option<PathBuf>,
}

/// Configured document pipeline.
pub struct Pipeline {
    options: PipelineOptions,
    compressor: Option<Arc<dyn Compressor>>,
    work_root: PathBuf,
    keep_work_dir: bool,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            compressor: None,
            work_root: default_work_root(),
            keep_work_dir: false,
        }
    }

    /// Build from application config. A remote compressor is created only in
    /// remote mode and only when an API key is configured.
    pub fn from_config(config: &AppConfig, watermark: Option<WatermarkSpec>) -> Self {
        let options = PipelineOptions {
            watermark,
            compression: config.compression.mode,
            placement_policy: config.placement_policy,
            verify: false,
        };

        let mut pipeline = Self::new(options)
            .with_work_root(config.work_root.clone().unwrap_or_else(default_work_root))
            .keep_work_dir(config.keep_work_dir);

        if config.compression.mode == CompressionMode::Remote
            && let Some(compressor) = create_compressor(&config.compression)
        {
            pipeline = pipeline.with_compressor(compressor);
        }

        pipeline
    }

    #[must_use]
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    #[must_use]
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    #[must_use]
    pub const fn keep_work_dir(mut self, keep: bool) -> Self {
        self.keep_work_dir = keep;
        self
    }

    #[must_use]
    pub const fn verify(mut self, verify: bool) -> Self {
        self.options.verify = verify;
        self
    }

    pub const fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn compressor_name(&self) -> Option<&'static str> {
        self.compressor.as_ref().map(|c| c.name())
    }

    /// Read `input` from disk and run.
    pub async fn run_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        progress: Option<ProgressFn>,
    ) -> Result<RunReport> {
        let input = input.as_ref();
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| Error::PdfOpen(format!("Failed to read file {}: {}", input.display(), e)))?;
        self.run(bytes, output, progress).await
    }

    /// Parse `input` and run.
    pub async fn run(
        &self,
        input: Vec<u8>,
        output: impl AsRef<Path>,
        progress: Option<ProgressFn>,
    ) -> Result<RunReport> {
        self.validate()?;
        let document = blocking(move || PdfDocument::from_bytes(input)).await?;
        self.run_document(document, output, progress).await
    }

    /// Process an already loaded document and write the archive to `output`.
    ///
    /// Nothing is written to `output` unless every page was split.
    pub async fn run_document(
        &self,
        document: PdfDocument,
        output: impl AsRef<Path>,
        progress: Option<ProgressFn>,
    ) -> Result<RunReport> {
        let output = output.as_ref().to_path_buf();
        let input_size = document.bytes().len();

        self.validate()?;

        emit(progress.as_ref(), Progress::Loaded {
            pages: document.page_count(),
        });
        info!(
            "Loaded {} ({} pages, {})",
            document.fingerprint(),
            document.page_count(),
            format_size(input_size)
        );

        let document = match self.options.watermark.clone() {
            Some(spec) => {
                let policy = self.options.placement_policy;
                let stamped = blocking(move || {
                    composite_document(&document, &spec.image, &spec.placement, policy)
                })
                .await?;
                emit(progress.as_ref(), Progress::Watermarked);
                stamped
            }
            None => document,
        };

        let (document, remote_compressed) = self.remote_pass(document).await;
        if self.options.compression == CompressionMode::Remote {
            emit(progress.as_ref(), Progress::RemoteCompression {
                applied: remote_compressed,
            });
        }

        // Dropped (and removed) on any failure below
        let workdir = WorkingDir::create(&self.work_root)?;
        let run_id = workdir.run_id();

        let split_options = SplitOptions {
            compress: self.options.compression != CompressionMode::None,
        };
        let verify = self.options.verify;
        let pages_dir = workdir.pages_dir();
        let notify = progress.clone();

        let (page_count, archive) = blocking(move || {
            let artifacts = split_with_progress(&document, split_options, |done, total| {
                emit(notify.as_ref(), Progress::PageSplit { done, total });
            })?;
            if verify {
                verify_artifacts(&document, &artifacts)?;
            }

            let archive = stage_and_package(&artifacts, &pages_dir, &output)?;
            emit(notify.as_ref(), Progress::Packaged {
                entries: archive.entries.len(),
            });
            Ok((artifacts.len(), archive))
        })
        .await?;

        info!(
            "Run {} packaged {} pages into {}",
            run_id,
            page_count,
            archive.path.display()
        );

        let work_dir = if self.keep_work_dir {
            Some(workdir.keep())
        } else {
            None
        };

        Ok(RunReport {
            run_id,
            archive,
            page_count,
            watermarked: self.options.watermark.is_some(),
            remote_compressed,
            input_size,
            work_dir,
        })
    }

    fn validate(&self) -> Result<()> {
        match &self.options.watermark {
            Some(spec) => spec.placement.validate(),
            None => Ok(()),
        }
    }

    /// Send the whole document to the remote compressor, falling back to the
    /// local copy on any failure.
    async fn remote_pass(&self, document: PdfDocument) -> (PdfDocument, bool) {
        if self.options.compression != CompressionMode::Remote {
            return (document, false);
        }

        let Some(compressor) = &self.compressor else {
            warn!("Remote compression requested but no API key is configured, compressing locally");
            return (document, false);
        };

        let compressed = match compressor.compress(document.bytes()).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_recoverable() => {
                warn!(
                    "Remote compression via {} failed, continuing locally: {}",
                    compressor.name(),
                    e
                );
                return (document, false);
            }
            Err(e) => {
                error!(
                    "Remote compression via {} returned an unexpected error, continuing locally: {}",
                    compressor.name(),
                    e
                );
                return (document, false);
            }
        };

        let expected = document.page_count();
        match blocking(move || PdfDocument::from_bytes(compressed)).await {
            Ok(parsed) if parsed.page_count() == expected => {
                info!(
                    "Remote compression: {} -> {}",
                    format_size(document.bytes().len()),
                    format_size(parsed.bytes().len())
                );
                (parsed, true)
            }
            Ok(parsed) => {
                warn!(
                    "Remote result has {} pages, expected {}, continuing locally",
                    parsed.page_count(),
                    expected
                );
                (document, false)
            }
            Err(e) => {
                warn!("Remote result is unreadable, continuing locally: {}", e);
                (document, false)
            }
        }
    }
}

/// Render page 1 with the watermark drawn where the real run would put it.
///
/// Absolute placements are stored in page units and are mapped onto the
/// preview together with their scale.
pub fn render_preview(document: &PdfDocument, watermark: Option<&WatermarkSpec>, scale: f32) -> Result<RgbaImage> {
    let page = PageRenderer::with_scale(document, scale).render_page(0)?;

    let Some(spec) = watermark else {
        return Ok(page);
    };

    let mapping = PreviewMapping::for_page(document, 0, scale)?;
    let placement = preview_placement(&spec.placement, &mapping);
    Ok(composite_raster(&page, &spec.image, &placement))
}

/// [`render_preview`] encoded as PNG.
pub fn render_preview_png(document: &PdfDocument, watermark: Option<&WatermarkSpec>, scale: f32) -> Result<Vec<u8>> {
    encode_png(&render_preview(document, watermark, scale)?)
}

fn preview_placement(placement: &Placement, mapping: &PreviewMapping) -> Placement {
    match *placement {
        Placement::Absolute { x, y, scale, opacity } => {
            let (px, py) = mapping.to_preview(x, y);
            Placement::Absolute {
                x: px,
                y: py,
                scale: scale * mapping.preview_width / mapping.source_width,
                opacity,
            }
        }
        ratio @ Placement::Ratio { .. } => ratio,
    }
}

/// Write the artifacts into `pages_dir` and zip them into `output`.
fn stage_and_package(artifacts: &[SplitArtifact], pages_dir: &Path, output: &Path) -> Result<ArchiveBundle> {
    for artifact in artifacts {
        std::fs::write(pages_dir.join(artifact.file_name()), &artifact.bytes)?;
    }
    package(pages_dir, output)
}

fn emit(progress: Option<&ProgressFn>, event: Progress) {
    if let Some(callback) = progress {
        callback(event);
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("Worker task failed: {e}"))))?
}
