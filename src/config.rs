//! Configuration structures and defaults for the Parcel upload client.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration recognized by the Upload Controller (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Initial target chunk size in bytes; the server's `/create` response
    /// may override this and the client adopts that value instead.
    pub chunk_size: u64,

    /// Maximum number of in-flight chunk transfers.
    pub concurrency: usize,

    /// Maximum retries per chunk before the controller transitions to `ERROR`.
    pub retry_count: u32,

    /// Base retry delay in milliseconds, before exponential backoff and jitter.
    pub retry_delay_ms: u64,

    /// Use parallel digest workers when splitting (falls back to inline otherwise).
    pub enable_multi_thread: bool,

    /// Base URL the transport adapter issues requests against.
    pub base_url: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024,
            concurrency: 4,
            retry_count: 3,
            retry_delay_ms: 1000,
            enable_multi_thread: true,
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

/// Configuration file structure (loaded from TOML).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub defaults: ConfigDefaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDefaults {
    pub chunk_size: Option<u64>,
    pub concurrency: Option<usize>,
    pub retry_count: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub enable_multi_thread: Option<bool>,
    pub base_url: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ClientError::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&content).map_err(|e| ClientError::Config(format!("failed to parse config file: {e}")))
    }

    /// Load with fallback priority: `./parcel.toml`, then `~/.parcel/parcel.toml`, then defaults.
    pub fn load_with_fallback() -> Self {
        if let Ok(config) = Self::load(Path::new("parcel.toml")) {
            return config;
        }

        if let Some(home) = home_dir() {
            let user_config = home.join(".parcel").join("parcel.toml");
            if let Ok(config) = Self::load(&user_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Apply this config file on top of an `UploadConfig`.
    pub fn apply_to(&self, config: &mut UploadConfig) {
        if let Some(chunk_size) = self.defaults.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(concurrency) = self.defaults.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(retry_count) = self.defaults.retry_count {
            config.retry_count = retry_count;
        }
        if let Some(retry_delay_ms) = self.defaults.retry_delay_ms {
            config.retry_delay_ms = retry_delay_ms;
        }
        if let Some(enable_multi_thread) = self.defaults.enable_multi_thread {
            config.enable_multi_thread = enable_multi_thread;
        }
        if let Some(ref base_url) = self.defaults.base_url {
            config.base_url = base_url.clone();
        }
    }

    /// Apply `PARCEL_*` environment variable overrides.
    pub fn apply_env(config: &mut UploadConfig) {
        if let Ok(v) = std::env::var("PARCEL_CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                config.chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("PARCEL_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                config.concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("PARCEL_RETRY_COUNT") {
            if let Ok(n) = v.parse() {
                config.retry_count = n;
            }
        }
        if let Ok(v) = std::env::var("PARCEL_BASE_URL") {
            config.base_url = v;
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_protocol_defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.retry_count, 3);
    }

    #[test]
    fn config_file_overrides_apply_selectively() {
        let file = ConfigFile {
            defaults: ConfigDefaults {
                chunk_size: Some(1024),
                concurrency: None,
                retry_count: Some(5),
                retry_delay_ms: None,
                enable_multi_thread: None,
                base_url: None,
            },
        };

        let mut config = UploadConfig::default();
        file.apply_to(&mut config);

        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.concurrency, 4); // untouched
    }
}
