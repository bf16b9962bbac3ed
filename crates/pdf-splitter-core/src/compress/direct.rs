use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tracing::info;

use super::http::{Failure, Retry, build_client, ensure_pdf, is_pdf_content_type, with_retry};
use super::traits::{Compressor, CompressorInfo};
use crate::config::Quality;
use crate::error::{Error, Result};
use crate::util::format_size;

/// Compression service that takes a multipart upload and answers with the
/// compressed PDF in the response body.
pub struct DirectCompressor {
    client: Client,
    /// Base URL of the API (e.g., "http://127.0.0.1:8501/api")
    pub api_base: String,
    api_key: String,
    pub quality: Quality,
    retry: Retry,
}

impl DirectCompressor {
    pub fn new(
        api_base: String,
        api_key: String,
        quality: Quality,
        timeout: Duration,
        retry_count: u32,
        retry_delay_ms: u64,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::CompressionMissingApiKey);
        }

        Ok(Self {
            client: build_client(timeout)?,
            api_base,
            api_key,
            quality,
            retry: Retry {
                count: retry_count,
                delay: Duration::from_millis(retry_delay_ms),
            },
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/pdf/compress", self.api_base.trim_end_matches('/'))
    }

    async fn attempt(&self, url: &str, pdf: &[u8]) -> std::result::Result<Vec<u8>, Failure> {
        let part = Part::bytes(pdf.to_vec())
            .file_name("document.pdf")
            .mime_str("application/pdf")?;
        let form = Form::new()
            .part("file", part)
            .text("quality", self.quality.as_str());

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::status(status, &body));
        }

        if !is_pdf_content_type(response.headers()) {
            let declared = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            return Err(Failure::fatal(Error::CompressionInvalidResponse(format!(
                "Expected application/pdf, got {declared}"
            ))));
        }

        let bytes = response.bytes().await?;
        ensure_pdf(bytes.to_vec()).map_err(Failure::fatal)
    }
}

#[async_trait]
impl Compressor for DirectCompressor {
    fn info(&self) -> CompressorInfo {
        CompressorInfo {
            name: "Direct upload",
            requires_api_key: true,
            remote: true,
        }
    }

    async fn compress(&self, pdf: &[u8]) -> Result<Vec<u8>> {
        let url = self.endpoint();
        let compressed = with_retry(self.retry, "Remote compression", || self.attempt(&url, pdf)).await?;

        info!(
            "Remote compression ({}): {} -> {}",
            self.quality.as_str(),
            format_size(pdf.len()),
            format_size(compressed.len())
        );
        Ok(compressed)
    }
}
