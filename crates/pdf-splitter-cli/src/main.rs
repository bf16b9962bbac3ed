//! PDF Splitter CLI - Split a PDF into watermarked single-page PDFs in a ZIP.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_splitter_core::{
    AppConfig, CompressionMode, PdfDocument, Pipeline, Placement, PlacementPolicy, PlacementPreset,
    Progress, ProgressFn, Quality, RemoteFlavor, Watermark, WatermarkSpec, render_preview_png,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetOption {
    Class10,
    Class12,
}

impl From<PresetOption> for PlacementPreset {
    fn from(opt: PresetOption) -> Self {
        match opt {
            PresetOption::Class10 => Self::Class10,
            PresetOption::Class12 => Self::Class12,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyOption {
    PerPage,
    FirstPage,
}

impl From<PolicyOption> for PlacementPolicy {
    fn from(opt: PolicyOption) -> Self {
        match opt {
            PolicyOption::PerPage => Self::PerPage,
            PolicyOption::FirstPage => Self::FirstPage,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionOption {
    Local,
    Remote,
    None,
}

impl From<CompressionOption> for CompressionMode {
    fn from(opt: CompressionOption) -> Self {
        match opt {
            CompressionOption::Local => Self::Local,
            CompressionOption::Remote => Self::Remote,
            CompressionOption::None => Self::None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QualityOption {
    Low,
    Medium,
    High,
}

impl From<QualityOption> for Quality {
    fn from(opt: QualityOption) -> Self {
        match opt {
            QualityOption::Low => Self::Low,
            QualityOption::Medium => Self::Medium,
            QualityOption::High => Self::High,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlavorOption {
    Direct,
    Link,
}

impl From<FlavorOption> for RemoteFlavor {
    fn from(opt: FlavorOption) -> Self {
        match opt {
            FlavorOption::Direct => Self::Direct,
            FlavorOption::Link => Self::Link,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pdf-split")]
#[command(author, version, about = "Split a PDF into single-page PDFs, optionally watermarked", long_about = None)]
struct Args {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output ZIP file (default: <input>-pages.zip)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Watermark image (PNG or JPEG)
    #[arg(long)]
    watermark: Option<PathBuf>,

    /// Watermark scale (fraction of native size, or of page width with ratios)
    #[arg(long)]
    scale: Option<f64>,

    /// Left edge of the watermark in page units
    #[arg(long, requires = "y", conflicts_with_all = ["x_ratio", "preview_x"])]
    x: Option<f64>,

    /// Top edge of the watermark in page units
    #[arg(long, requires = "x")]
    y: Option<f64>,

    /// Horizontal position as a fraction of the free space (0..1)
    #[arg(long, requires = "y_ratio", conflicts_with = "preview_x")]
    x_ratio: Option<f64>,

    /// Vertical position as a fraction of the free space (0..1)
    #[arg(long, requires = "x_ratio")]
    y_ratio: Option<f64>,

    /// Watermark opacity (0..1)
    #[arg(long, default_value_t = 1.0)]
    opacity: f64,

    /// Left edge of the watermark in preview pixels
    #[arg(long, requires = "preview_y")]
    preview_x: Option<f64>,

    /// Top edge of the watermark in preview pixels
    #[arg(long, requires = "preview_x")]
    preview_y: Option<f64>,

    /// Built-in placement layout
    #[arg(long, value_enum, default_value = "class10")]
    preset: PresetOption,

    /// Resolve placement per page or reuse page 1's geometry
    #[arg(long, value_enum)]
    placement_policy: Option<PolicyOption>,

    /// How the output is compressed
    #[arg(long, value_enum)]
    compression: Option<CompressionOption>,

    /// Remote compression protocol
    #[arg(long, value_enum)]
    remote_flavor: Option<FlavorOption>,

    /// Remote compression API base URL
    #[arg(long, env = "APDF_API_BASE")]
    api_base: Option<String>,

    /// Remote compression API key
    #[arg(long, env = "APDF_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Remote compression quality
    #[arg(long, value_enum)]
    quality: Option<QualityOption>,

    /// Parent directory for per-run working directories
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Keep the working directory after the run
    #[arg(long)]
    keep_work_dir: bool,

    /// Write a PNG preview of page 1 with the watermark
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Scale for the preview render (1.1 by default)
    #[arg(long)]
    preview_scale: Option<f32>,

    /// Reassemble the pages and check them against the source before zipping
    #[arg(long)]
    verify: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(mode) = self.compression {
            config.compression.mode = mode.into();
        }
        if let Some(flavor) = self.remote_flavor {
            config.compression.flavor = flavor.into();
        }
        if let Some(ref base) = self.api_base {
            config.compression.api_base.clone_from(base);
        }
        if self.api_key.is_some() {
            config.compression.api_key.clone_from(&self.api_key);
        }
        if let Some(quality) = self.quality {
            config.compression.quality = quality.into();
        }
        if let Some(policy) = self.placement_policy {
            config.placement_policy = policy.into();
        }
        if let Some(scale) = self.preview_scale {
            config.preview_scale = scale;
        }
        if self.work_dir.is_some() {
            config.work_root.clone_from(&self.work_dir);
        }
        if self.keep_work_dir {
            config.keep_work_dir = true;
        }
    }

    /// Build the watermark placement from whichever position flags were given.
    fn watermark_spec(&self, image: Watermark, document: &PdfDocument, preview_scale: f32) -> Result<WatermarkSpec> {
        let preset = PlacementPreset::from(self.preset);
        let scale = self.scale.unwrap_or_else(|| preset.scale());

        let spec = if let (Some(x_ratio), Some(y_ratio)) = (self.x_ratio, self.y_ratio) {
            WatermarkSpec::new(image, Placement::ratio(x_ratio, y_ratio, scale))
        } else if let (Some(x), Some(y)) = (self.x, self.y) {
            WatermarkSpec::new(image, Placement::absolute(x, y, scale))
        } else {
            let (px, py) = match (self.preview_x, self.preview_y) {
                (Some(px), Some(py)) => (px, py),
                _ => preset.preview_position(),
            };
            WatermarkSpec::from_preview(image, document, px, py, scale, preview_scale)
                .context("Failed to map preview position")?
        };

        let placement = spec.placement.with_opacity(self.opacity);
        placement.validate().context("Invalid watermark placement")?;
        Ok(WatermarkSpec::new(spec.image, placement))
    }
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    input.with_file_name(format!("{stem}-pages.zip"))
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

fn progress_callback(pb: ProgressBar) -> ProgressFn {
    Arc::new(move |event: Progress| match event {
        Progress::Loaded { pages } => {
            pb.set_length(pages as u64);
            pb.set_message("loaded");
        }
        Progress::Watermarked => pb.set_message("watermarked"),
        Progress::RemoteCompression { applied: true } => pb.set_message("compressed remotely"),
        Progress::RemoteCompression { applied: false } => pb.set_message("remote compression skipped"),
        Progress::PageSplit { done, .. } => {
            pb.set_position(done as u64);
            pb.set_message(format!("page {done}"));
        }
        Progress::Packaged { .. } => pb.set_message("packaged"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    // Override config with CLI arguments
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    // The document is only parsed up front when placement or preview needs it
    let needs_document = args.watermark.is_some() || args.preview.is_some();
    let document = if needs_document {
        info!("Loading PDF: {}", args.input.display());
        Some(
            PdfDocument::from_file(&args.input)
                .context(format!("Failed to load PDF: {}", args.input.display()))?,
        )
    } else {
        None
    };

    let watermark = match (&args.watermark, &document) {
        (Some(path), Some(doc)) => {
            let image = Watermark::from_file(path)
                .context(format!("Failed to load watermark: {}", path.display()))?;
            Some(args.watermark_spec(image, doc, config.preview_scale)?)
        }
        _ => None,
    };

    if let (Some(preview_path), Some(doc)) = (&args.preview, &document) {
        let png = render_preview_png(doc, watermark.as_ref(), config.preview_scale)
            .context("Failed to render preview")?;
        std::fs::write(preview_path, png)
            .context(format!("Failed to write preview: {}", preview_path.display()))?;
        info!("Preview written to {}", preview_path.display());
    }

    let output_path = args.output.clone().unwrap_or_else(|| default_output(&args.input));

    let pipeline = Pipeline::from_config(&config, watermark).verify(args.verify);
    if let Some(name) = pipeline.compressor_name() {
        info!("Remote compression via {}", name);
    }

    let pb = progress_bar();
    let progress = Some(progress_callback(pb.clone()));
    let run = match document {
        Some(doc) => pipeline.run_document(doc, &output_path, progress).await,
        None => pipeline.run_file(&args.input, &output_path, progress).await,
    };
    let report = run
        .inspect_err(|e| pb.abandon_with_message(e.user_message()))
        .context(format!("Failed to split {}", args.input.display()))?;

    pb.finish_with_message("done");

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!(
            "Wrote {} pages to {}{}",
            report.page_count,
            report.archive.path.display(),
            if report.remote_compressed { " (remote compression)" } else { "" }
        );
        if let Some(dir) = &report.work_dir {
            println!("Working directory kept at {}", dir.display());
        }
    }

    Ok(())
}
