use std::path::PathBuf;

use super::engine_settings::EngineSettings;
use crate::repositories::{BoxFuture, RepositoryError, RepositoryResult};

pub trait SettingsRepository: Send + Sync + 'static {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<EngineSettings>>;
    fn save(&self, settings: EngineSettings) -> BoxFuture<'static, RepositoryResult<()>>;
}

pub struct SettingsJsonRepository {
    file_path: PathBuf,
}

impl SettingsJsonRepository {
    /// Repository at `<config_dir>/threadline/settings.json`
    pub fn new() -> RepositoryResult<Self> {
        Ok(Self {
            file_path: EngineSettings::app_dir()?.join("settings.json"),
        })
    }

    pub fn with_path(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

impl SettingsRepository for SettingsJsonRepository {
    fn load(&self) -> BoxFuture<'static, RepositoryResult<EngineSettings>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(EngineSettings::default());
                }
                Err(e) => return Err(e.into()),
            };

            Ok(serde_json::from_str(&contents)?)
        })
    }

    fn save(&self, settings: EngineSettings) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            let json = serde_json::to_string_pretty(&settings)?;

            tokio::task::spawn_blocking(move || {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                // Write atomically using temp file + rename
                let temp_path = path.with_extension("json.tmp");
                std::fs::write(&temp_path, &json)?;
                std::fs::rename(&temp_path, &path)?;

                Ok::<(), RepositoryError>(())
            })
            .await
            .map_err(|e| RepositoryError::InitializationError {
                message: format!("settings writer task failed: {}", e),
            })?
        })
    }
}
