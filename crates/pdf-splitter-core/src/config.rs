use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// How the pipeline shrinks its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// Prune, deflate and renumber each page locally
    #[default]
    Local,
    /// Send the whole document to the remote service first, then compress locally
    Remote,
    /// Isolate pages only, keep streams as they are
    None,
}

impl CompressionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality tier sent to the remote compression service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Low,
    Medium,
    High,
}

impl Quality {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Which remote protocol to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteFlavor {
    /// Multipart upload, compressed PDF in the response body
    #[default]
    Direct,
    /// Upload to a file host, pass the link, download the result link
    Link,
}

/// Whether watermark geometry follows each page or is fixed from page 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementPolicy {
    #[default]
    PerPage,
    FirstPage,
}

/// Remote compression service configuration.
///
/// The API key is an explicit value: when it is `None` the remote path is
/// disabled and the pipeline compresses locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default)]
    pub mode: CompressionMode,
    #[serde(default)]
    pub flavor: RemoteFlavor,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// File host used by the link flavor
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_api_base() -> String {
    "http://127.0.0.1:8501/api".to_string()
}

fn default_upload_url() -> String {
    "https://file.io".to_string()
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_retry_count() -> u32 {
    2
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            mode: CompressionMode::default(),
            flavor: RemoteFlavor::default(),
            api_base: default_api_base(),
            upload_url: default_upload_url(),
            api_key: None,
            quality: Quality::default(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Compression settings
    #[serde(default)]
    pub compression: CompressionConfig,

    /// How watermark geometry is resolved across pages of differing size
    #[serde(default)]
    pub placement_policy: PlacementPolicy,

    /// Scale factor used to render the page-1 preview (1.1 ≈ 79 DPI)
    #[serde(default = "default_preview_scale")]
    pub preview_scale: f32,

    /// Parent directory for per-run working directories (defaults to the system temp dir)
    pub work_root: Option<PathBuf>,

    /// Keep the working directory after the run finishes
    #[serde(default)]
    pub keep_work_dir: bool,
}

const fn default_preview_scale() -> f32 {
    1.1
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            placement_policy: PlacementPolicy::default(),
            preview_scale: default_preview_scale(),
            work_root: None,
            keep_work_dir: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations (~/.config/pdf-splitter/config.toml, ./config.toml)
    pub fn load() -> Self {
        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("pdf-splitter").join("config.toml");
            if user_config.exists() {
                match Self::from_file(&user_config) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {}", user_config.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./config.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./config.toml: {}", e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if !(self.preview_scale.is_finite() && self.preview_scale > 0.0) {
            return Err(Error::ConfigInvalid {
                field: "preview_scale".to_string(),
                reason: format!("must be a positive number, got {}", self.preview_scale),
            });
        }
        if self.compression.timeout_secs == 0 {
            return Err(Error::ConfigInvalid {
                field: "compression.timeout_secs".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.compression.retry_count == 0 {
            return Err(Error::ConfigInvalid {
                field: "compression.retry_count".to_string(),
                reason: "must allow at least one attempt".to_string(),
            });
        }
        Ok(())
    }
}

/// Placement defaults for the two exam layouts the tool was built around.
///
/// Positions are in preview pixels (page rendered at scale 1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementPreset {
    Class10,
    Class12,
}

impl PlacementPreset {
    /// Watermark scale as a fraction of its native size
    pub const fn scale(self) -> f64 {
        match self {
            Self::Class10 => 0.26,
            Self::Class12 => 0.30,
        }
    }

    /// Top-left corner of the watermark on the preview
    pub const fn preview_position(self) -> (f64, f64) {
        match self {
            Self::Class10 => (380.0, 520.0),
            Self::Class12 => (380.0, 700.0),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "class10" => Some(Self::Class10),
            "class12" => Some(Self::Class12),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.compression.mode, CompressionMode::Local);
        assert_eq!(config.placement_policy, PlacementPolicy::PerPage);
        assert!(config.compression.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            placement_policy = "first-page"
            preview_scale = 2.0

            [compression]
            mode = "remote"
            flavor = "link"
            quality = "high"
            "#,
        )
        .unwrap();

        assert_eq!(config.placement_policy, PlacementPolicy::FirstPage);
        assert_eq!(config.compression.mode, CompressionMode::Remote);
        assert_eq!(config.compression.flavor, RemoteFlavor::Link);
        assert_eq!(config.compression.quality.as_str(), "high");
        assert_eq!(config.compression.timeout_secs, 60);
    }

    #[test]
    fn test_validate_rejects_zero_scale() {
        let config = AppConfig {
            preview_scale: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::ConfigInvalid { ref field, .. }) if field == "preview_scale"
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let result = AppConfig::from_file("/nonexistent/pdf-splitter.toml");
        assert!(matches!(result, Err(Error::ConfigLoad(_))));
    }

    #[test]
    fn test_preset_from_name() {
        assert_eq!(PlacementPreset::from_name("Class 10"), Some(PlacementPreset::Class10));
        assert_eq!(PlacementPreset::from_name("class-12"), Some(PlacementPreset::Class12));
        assert_eq!(PlacementPreset::from_name("class11"), None);
        assert!((PlacementPreset::Class12.scale() - 0.30).abs() < f64::EPSILON);
    }
}
