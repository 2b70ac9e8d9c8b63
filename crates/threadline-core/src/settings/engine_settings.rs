use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::repositories::{RepositoryError, RepositoryResult};

/// Bounds of the event dedup registry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    /// Seconds a key stays in the registry
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// Run a prune pass every N insertions
    pub prune_every: u64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 200,
            prune_every: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub dedup: DedupSettings,
    pub initial_page_size: usize,
    pub load_more_page_size: usize,
    /// SQLite file; defaults to the per-user config directory
    pub database_path: Option<PathBuf>,
    pub backend_url: Option<String>,
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub log_filter: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dedup: DedupSettings::default(),
            initial_page_size: 50,
            load_more_page_size: 50,
            database_path: None,
            backend_url: None,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineSettings {
    /// `<config_dir>/threadline`
    pub fn app_dir() -> RepositoryResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            RepositoryError::InitializationError {
                message: "Cannot determine config directory".into(),
            }
        })?;
        Ok(config_dir.join("threadline"))
    }

    pub fn resolved_database_path(&self) -> RepositoryResult<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::app_dir()?.join("conversations.db")),
        }
    }
}
