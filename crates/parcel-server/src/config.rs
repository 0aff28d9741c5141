//! Server configuration, layered CLI > env > file > built-in default.

use crate::error::{ServerError, ServerResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_STORAGE_ROOT: &str = "uploads";
const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 10 * 1024 * 1024 * 1024; // 10 GiB
const DEFAULT_MAX_CHUNK_SIZE: u64 = 50 * 1024 * 1024; // 50 MiB
const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024; // 5 MiB
const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60; // 24 hours

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub storage_root: PathBuf,
    pub max_artifact_size: u64,
    pub max_chunk_size: u64,
    pub default_chunk_size: u64,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            jwt_secret: "change-me-in-production".to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

/// CLI flags, the highest-precedence configuration source.
#[derive(clap::Parser, Debug, Default)]
#[command(name = "parcel-server", about = "Resumable upload chunk store and assembly service")]
pub struct CliArgs {
    /// Path to a TOML config file. Defaults to ./parcel-server.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub bind_addr: Option<String>,

    #[arg(long)]
    pub storage_root: Option<PathBuf>,

    #[arg(long)]
    pub jwt_secret: Option<String>,
}

/// Shape of the optional TOML config file. Every field is optional so a
/// file only needs to mention the settings it wants to override.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    bind_addr: Option<String>,
    storage_root: Option<PathBuf>,
    max_artifact_size: Option<u64>,
    max_chunk_size: Option<u64>,
    default_chunk_size: Option<u64>,
    jwt_secret: Option<String>,
    token_ttl_secs: Option<i64>,
}

impl ConfigFile {
    fn load(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ServerError::Validation(format!("invalid config file: {e}")))
    }

    fn apply_to(&self, config: &mut ServerConfig) {
        if let Some(ref v) = self.bind_addr {
            config.bind_addr = v.clone();
        }
        if let Some(ref v) = self.storage_root {
            config.storage_root = v.clone();
        }
        if let Some(v) = self.max_artifact_size {
            config.max_artifact_size = v;
        }
        if let Some(v) = self.max_chunk_size {
            config.max_chunk_size = v;
        }
        if let Some(v) = self.default_chunk_size {
            config.default_chunk_size = v;
        }
        if let Some(ref v) = self.jwt_secret {
            config.jwt_secret = v.clone();
        }
        if let Some(v) = self.token_ttl_secs {
            config.token_ttl_secs = v;
        }
    }
}

impl ServerConfig {
    /// Build the effective configuration: defaults, overridden by an
    /// optional TOML file, overridden by `PARCEL_*` environment variables,
    /// overridden by explicit CLI flags.
    pub fn load(cli: &CliArgs) -> ServerConfig {
        let mut config = ServerConfig::default();

        let file_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("parcel-server.toml"));
        if let Ok(file) = ConfigFile::load(&file_path) {
            file.apply_to(&mut config);
        }

        config.apply_env();
        config.apply_cli(cli);
        config
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("PARCEL_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("PARCEL_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PARCEL_JWT_SECRET") {
            self.jwt_secret = v;
        }
        if let Ok(v) = std::env::var("PARCEL_MAX_ARTIFACT_SIZE") {
            if let Ok(parsed) = v.parse() {
                self.max_artifact_size = parsed;
            }
        }
        if let Ok(v) = std::env::var("PARCEL_DEFAULT_CHUNK_SIZE") {
            if let Ok(parsed) = v.parse() {
                self.default_chunk_size = parsed;
            }
        }
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(ref v) = cli.bind_addr {
            self.bind_addr = v.clone();
        }
        if let Some(ref v) = cli.storage_root {
            self.storage_root = v.clone();
        }
        if let Some(ref v) = cli.jwt_secret {
            self.jwt_secret = v.clone();
        }
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.storage_root.join("metadata")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.storage_root.join("chunks")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.storage_root.join("files")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.max_artifact_size, 10 * 1024 * 1024 * 1024);
        assert_eq!(config.max_chunk_size, 50 * 1024 * 1024);
        assert_eq!(config.default_chunk_size, 5 * 1024 * 1024);
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let mut config = ServerConfig::default();
        let cli = CliArgs {
            config: None,
            bind_addr: Some("127.0.0.1:9000".to_string()),
            storage_root: None,
            jwt_secret: None,
        };
        config.apply_cli(&cli);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }
}
