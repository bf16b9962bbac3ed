mod direct;
mod http;
mod link;
mod traits;

pub use direct::DirectCompressor;
pub use link::LinkCompressor;
pub use traits::{Compressor, CompressorInfo};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{CompressionConfig, RemoteFlavor};

/// Create a remote compressor from configuration.
///
/// Returns `None` when no API key is configured or the client cannot be
/// built; the pipeline then compresses locally only.
pub fn create_compressor(config: &CompressionConfig) -> Option<Arc<dyn Compressor>> {
    let Some(api_key) = config.api_key.clone().filter(|k| !k.trim().is_empty()) else {
        debug!("No API key configured, remote compression disabled");
        return None;
    };

    let timeout = Duration::from_secs(config.timeout_secs);

    let built: crate::error::Result<Arc<dyn Compressor>> = match config.flavor {
        RemoteFlavor::Direct => DirectCompressor::new(
            config.api_base.clone(),
            api_key,
            config.quality,
            timeout,
            config.retry_count,
            config.retry_delay_ms,
        )
        .map(|c| Arc::new(c) as Arc<dyn Compressor>),
        RemoteFlavor::Link => LinkCompressor::new(
            config.api_base.clone(),
            config.upload_url.clone(),
            api_key,
            timeout,
            config.retry_count,
            config.retry_delay_ms,
        )
        .map(|c| Arc::new(c) as Arc<dyn Compressor>),
    };

    match built {
        Ok(compressor) => Some(compressor),
        Err(e) => {
            warn!("Remote compression disabled: {}", e);
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_key() {
        let config = CompressionConfig::default();
        assert!(create_compressor(&config).is_none());

        let blank = CompressionConfig {
            api_key: Some(String::new()),
            ..CompressionConfig::default()
        };
        assert!(create_compressor(&blank).is_none());
    }

    #[test]
    fn test_flavor_selects_backend() {
        let direct = CompressionConfig {
            api_key: Some("token".to_string()),
            ..CompressionConfig::default()
        };
        assert_eq!(create_compressor(&direct).unwrap().name(), "Direct upload");

        let link = CompressionConfig {
            flavor: RemoteFlavor::Link,
            ..direct
        };
        assert_eq!(create_compressor(&link).unwrap().name(), "Link upload");
    }
}
