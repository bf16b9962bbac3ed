use async_trait::async_trait;

use crate::error::Result;

/// Information about a compression backend
#[derive(Debug, Clone)]
pub struct CompressorInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Whether this backend needs an API key
    pub requires_api_key: bool,
    /// Whether the document leaves the machine
    pub remote: bool,
}

/// Trait for whole-document compression backends.
///
/// Every failure from a remote backend is recoverable: callers fall back to
/// the uncompressed document.
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Get information about this backend
    fn info(&self) -> CompressorInfo;

    /// Get the backend name (convenience method)
    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Compress a complete PDF, returning the new PDF bytes
    async fn compress(&self, pdf: &[u8]) -> Result<Vec<u8>>;
}
