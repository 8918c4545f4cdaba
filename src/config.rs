//! Server configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `ADVISORD_*` environment variables (nested keys separated by `__`, e.g.
//! `ADVISORD_GEMINI__IMAGE_MODEL`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

/// Default upload limit (15MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;

/// Generative model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key; falls back to `GEMINI_API_KEY`
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model used for the text analysis call
    pub analysis_model: String,
    /// Model used for image regeneration calls
    pub image_model: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            analysis_model: "gemini-2.0-flash-thinking-exp".to_string(),
            image_model: "gemini-2.0-flash-exp".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Root for `results/` and `uploads/`
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub purge_interval_secs: u64,
    pub purge_max_age_secs: u64,
    /// Analyze requests allowed per client address per minute
    pub rate_limit_per_minute: u32,
    pub gemini: GeminiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("data"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            purge_interval_secs: 60 * 60,
            purge_max_age_secs: 60 * 60,
            rate_limit_per_minute: 10,
            gemini: GeminiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let mut config: Config = figment
            .merge(Env::prefixed("ADVISORD_").split("__"))
            .extract()?;

        if config.gemini.api_key.is_none() {
            config.gemini.api_key = std::env::var("GEMINI_API_KEY").ok();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.purge_interval_secs == 0 {
            return Err(AdvisorError::Config(
                "purge_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(AdvisorError::Config(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding generated images
    pub fn results_dir(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    /// Directory holding raw uploads
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn purge_max_age(&self) -> Duration {
        Duration::from_secs(self.purge_max_age_secs)
    }
}
