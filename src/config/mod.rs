mod file_config;

pub use file_config::{FileConfig, StoreConfig};

use crate::catalog_store::StoreOptions;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub read_pool_size: usize,
    pub busy_timeout_ms: u64,
    pub allow_duplicate_emails: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            read_pool_size: 4,
            busy_timeout_ms: 5000,
            allow_duplicate_emails: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub read_pool_size: usize,
    pub busy_timeout_ms: u64,
    pub unique_customer_emails: bool,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let store = file.store.unwrap_or_default();
        let read_pool_size = store.read_pool_size.unwrap_or(cli.read_pool_size);
        let busy_timeout_ms = store.busy_timeout_ms.unwrap_or(cli.busy_timeout_ms);
        let unique_customer_emails = store
            .unique_customer_emails
            .unwrap_or(!cli.allow_duplicate_emails);

        Ok(Self {
            db_dir,
            read_pool_size,
            busy_timeout_ms,
            unique_customer_emails,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            read_pool_size: self.read_pool_size,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            unique_customer_emails: self.unique_customer_emails,
        }
    }
}
