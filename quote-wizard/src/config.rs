//! Wizard configuration, read from TOML with environment overrides.
//!
//! ```toml
//! api_base_url = "https://quotes.example.jp"
//! request_timeout_secs = 30
//! tax_rate = "0.10"
//! output_dir = "./documents"
//!
//! [attachments]
//! max_file_bytes = 10485760
//! max_total_bytes = 52428800
//! max_files = 20
//!
//! [prefill]
//! backend = "sqlite"
//! connection_string = "prefill.db"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use quote_core::backend::StoreConfig;
use quote_core::calculations::DEFAULT_TAX_RATE;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::attachments::AttachmentLimits;

pub const ENV_API_URL: &str = "QUOTE_API_URL";
pub const ENV_TAX_RATE: &str = "QUOTE_TAX_RATE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub tax_rate: Decimal,
    pub attachments: AttachmentLimits,
    pub prefill: StoreConfig,
    pub output_dir: PathBuf,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            tax_rate: DEFAULT_TAX_RATE,
            attachments: AttachmentLimits::default(),
            prefill: StoreConfig::default(),
            output_dir: PathBuf::from("documents"),
        }
    }
}

impl WizardConfig {
    /// Loads `path` if given and present, otherwise starts from defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = %path.display(), "loaded config file");
                Self::from_toml_str(&text)?
            }
            Some(path) => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(rate) = lookup(ENV_TAX_RATE).filter(|v| !v.trim().is_empty()) {
            self.tax_rate = rate
                .trim()
                .parse()
                .map_err(|e: rust_decimal::Error| ConfigError::InvalidValue {
                    key: ENV_TAX_RATE,
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tax_rate < Decimal::ZERO || self.tax_rate >= Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                key: "tax_rate",
                message: format!("{} is outside [0, 1)", self.tax_rate),
            });
        }
        if self.attachments.max_files == 0 {
            return Err(ConfigError::InvalidValue {
                key: "attachments.max_files",
                message: "must be at least 1".to_string(),
            });
        }
        if self.attachments.max_file_bytes > self.attachments.max_total_bytes {
            return Err(ConfigError::InvalidValue {
                key: "attachments.max_file_bytes",
                message: "exceeds attachments.max_total_bytes".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
