use crate::config::{self, ConfigKey, ConfigStore, ModelConfig};
use tauri::State;

/// Load model configuration (defaults if never saved)
#[tauri::command]
#[specta::specta]
pub fn load_model_config(config_store: State<config::Config>) -> ModelConfig {
    config::load_model_config(config_store.inner())
}

/// Save model configuration. Applies to the next download or speech request.
#[tauri::command]
#[specta::specta]
pub fn save_model_config(
    config_store: State<config::Config>,
    config: ModelConfig,
) -> Result<(), String> {
    if config.model_id.trim().is_empty() {
        return Err("Model ID cannot be empty".to_string());
    }
    config_store.set(&ConfigKey::MODEL, config)
}
