use thiserror::Error;

/// Unified error type for pdf-splitter-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - PDF operations (opening, rendering, splitting, watermarking, saving)
/// - Watermark image decoding
/// - Remote compression requests
/// - Archive creation
/// - Configuration loading and validation
/// - General I/O operations
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // PDF Errors
    // ==========================================================================
    /// Failed to open or parse a PDF file
    #[error("failed to open PDF: {0}")]
    PdfOpen(String),

    /// Invalid page number requested
    #[error("invalid page number {page} (document has {total} pages)")]
    PdfInvalidPage { page: usize, total: usize },

    /// Failed to render a PDF page
    #[error("failed to render page {page}: {reason}")]
    PdfRender { page: usize, reason: String },

    /// Failed to place a watermark on a page
    #[error("failed to watermark page {page}: {reason}")]
    Watermark { page: usize, reason: String },

    /// Failed to save a PDF
    #[error("failed to save PDF: {0}")]
    PdfSave(String),

    /// Error from the lopdf library
    #[error("lopdf error: {0}")]
    Lopdf(String),

    // ==========================================================================
    // Input Image Errors
    // ==========================================================================
    /// Watermark image could not be decoded (unsupported or corrupt)
    #[error("unsupported watermark image: {0}")]
    WatermarkImage(String),

    // ==========================================================================
    // Remote Compression Errors
    // ==========================================================================
    /// Compression API request failed
    #[error("compression request failed: {0}")]
    CompressionRequest(String),

    /// Compression API answered with something other than a PDF
    #[error("invalid compression response: {0}")]
    CompressionInvalidResponse(String),

    /// Compression request timed out
    #[error("compression request timed out")]
    CompressionTimeout,

    /// Remote compression requested but no API token is configured
    #[error("compression API key not configured")]
    CompressionMissingApiKey,

    // ==========================================================================
    // Archive Errors
    // ==========================================================================
    /// Failed to build the output archive
    #[error("failed to write archive: {0}")]
    Archive(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the pipeline may continue after this error.
    ///
    /// Only remote compression failures are recoverable: the run falls back
    /// to local compression.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CompressionRequest(_)
                | Self::CompressionInvalidResponse(_)
                | Self::CompressionTimeout
                | Self::CompressionMissingApiKey
        )
    }

    /// Short message suitable for showing to the person who started the run.
    ///
    /// `Display` keeps the diagnostic detail for logs.
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::PdfOpen(_) => "The PDF is corrupt or unreadable.",
            Self::PdfInvalidPage { .. } => "The requested page does not exist.",
            Self::WatermarkImage(_) => "The watermark must be a PNG or JPEG image.",
            Self::PdfRender { .. } => "The preview could not be rendered.",
            Self::Watermark { .. } | Self::PdfSave(_) | Self::Lopdf(_) => {
                "The document could not be processed."
            }
            Self::CompressionRequest(_)
            | Self::CompressionInvalidResponse(_)
            | Self::CompressionTimeout
            | Self::CompressionMissingApiKey => "Remote compression is unavailable.",
            Self::Archive(_) => "The archive could not be created.",
            Self::ConfigLoad(_) | Self::ConfigInvalid { .. } => "The configuration is invalid.",
            Self::Io(_) => "A file could not be read or written.",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
