pub mod engine_settings;
pub mod settings_json_repository;

pub use engine_settings::{DedupSettings, EngineSettings};
pub use settings_json_repository::{SettingsJsonRepository, SettingsRepository};
