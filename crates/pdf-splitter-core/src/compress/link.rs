use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use super::http::{Failure, Retry, build_client, ensure_pdf, with_retry};
use super::traits::{Compressor, CompressorInfo};
use crate::error::{Error, Result};
use crate::util::format_size;

/// Compression service that works on links: the PDF is uploaded to a file
/// host, the service is given the link and answers with a link to the
/// compressed result.
pub struct LinkCompressor {
    client: Client,
    /// Base URL of the compression API (e.g., "https://apdf.io/api")
    pub api_base: String,
    /// File host accepting multipart uploads
    pub upload_url: String,
    api_key: String,
    retry: Retry,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompressResponse {
    file: Option<String>,
}

impl LinkCompressor {
    pub fn new(
        api_base: String,
        upload_url: String,
        api_key: String,
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
            upload_url,
            api_key,
            retry: Retry {
                count: retry_count,
                delay: Duration::from_millis(retry_delay_ms),
            },
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/pdf/file/compress", self.api_base.trim_end_matches('/'))
    }

    /// Upload the source and return its public link
    async fn upload(&self, pdf: &[u8]) -> std::result::Result<String, Failure> {
        let part = Part::bytes(pdf.to_vec())
            .file_name("document.pdf")
            .mime_str("application/pdf")?;

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::status(status, &body));
        }

        let parsed: UploadResponse = response.json().await?;
        required(parsed.link, "link", "upload")
    }

    /// Ask the service to compress the linked file and return the result link
    async fn request(&self, link: &str) -> std::result::Result<String, Failure> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .form(&[("file", link)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::status(status, &body));
        }

        let parsed: CompressResponse = response.json().await?;
        required(parsed.file, "file", "compression")
    }

    async fn download(&self, link: &str) -> std::result::Result<Vec<u8>, Failure> {
        let response = self.client.get(link).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::status(status, &body));
        }

        let bytes = response.bytes().await?;
        ensure_pdf(bytes.to_vec()).map_err(Failure::fatal)
    }
}

fn required(value: Option<String>, field: &str, step: &str) -> std::result::Result<String, Failure> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            Failure::fatal(Error::CompressionInvalidResponse(format!(
                "{step} response has no `{field}`"
            )))
        })
}

#[async_trait]
impl Compressor for LinkCompressor {
    fn info(&self) -> CompressorInfo {
        CompressorInfo {
            name: "Link upload",
            requires_api_key: true,
            remote: true,
        }
    }

    async fn compress(&self, pdf: &[u8]) -> Result<Vec<u8>> {
        let source = with_retry(self.retry, "Upload", || self.upload(pdf)).await?;
        debug!("Uploaded source to {}", source);

        let result = with_retry(self.retry, "Remote compression", || self.request(&source)).await?;
        debug!("Compressed file at {}", result);

        let compressed = with_retry(self.retry, "Download", || self.download(&result)).await?;

        info!(
            "Remote compression: {} -> {}",
            format_size(pdf.len()),
            format_size(compressed.len())
        );
        Ok(compressed)
    }
}
