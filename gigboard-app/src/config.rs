use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use gigboard_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Optional config file read from the working directory.
pub const CONFIG_FILE: &str = "gigboard.toml";

/// Application configuration managed by Figment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory holding one subdirectory per database.
    /// Env: `GIGBOARD_DATA_DIR`. Default: `gigboard_data`.
    pub data_dir: PathBuf,

    /// Database holding posted jobs.
    /// Env: `GIGBOARD_JOBS_DATABASE`. Default: `local-gig-connect`.
    pub jobs_database: String,

    /// Database holding saved notes.
    /// Env: `GIGBOARD_NOTES_DATABASE`. Default: `my-app`.
    pub notes_database: String,

    /// fsync every commit.
    /// Env: `GIGBOARD_SYNC_WRITES`. Default: `true`.
    pub sync_writes: bool,

    /// RocksDB block cache per column family, in MiB.
    /// Env: `GIGBOARD_BLOCK_CACHE_MB`. Default: `64`.
    pub block_cache_mb: usize,

    /// Jobs created by "generate demo data".
    /// Env: `GIGBOARD_DEMO_JOBS`. Default: `5`.
    pub demo_jobs: usize,

    /// Fallback filter when `RUST_LOG` is unset.
    /// Env: `GIGBOARD_LOG_LEVEL`. Default: `info`.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("gigboard_data"),
            jobs_database: "local-gig-connect".to_string(),
            notes_database: "my-app".to_string(),
            sync_writes: true,
            block_cache_mb: 64,
            demo_jobs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then `gigboard.toml`, then `GIGBOARD_*` environment variables.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("GIGBOARD_"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// Store tuning for the database root.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.data_dir.clone(),
            block_cache_size: self.block_cache_mb * 1024 * 1024,
            sync_writes: self.sync_writes,
            ..StoreConfig::default()
        }
    }
}
