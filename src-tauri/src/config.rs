use std::marker::PhantomData;

use menubar_tts_engine::DEFAULT_MODEL_ID;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== Model Configuration =====

/// Speech model settings (stored locally)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Hugging Face repository of the speech model
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Branch, tag or commit to download
    #[serde(default)]
    pub revision: Option<String>,
    /// Directory holding `download_model.py` and the `.venv`
    #[serde(default)]
    pub python_root: Option<String>,
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            revision: None,
            python_root: None,
        }
    }
}

impl ConfigKey<ModelConfig> {
    pub const MODEL: Self = Self::new("modelConfig");
}

// ===== Type-Safe Config Store =====

pub trait ConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), String>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), String>;
}

/// Type-safe configuration store that wraps the Tauri plugin store
#[derive(Clone)]
pub struct Config {
    store: std::sync::Arc<tauri_plugin_store::Store<tauri::Wry>>,
}

impl Config {
    pub fn new(store: std::sync::Arc<tauri_plugin_store::Store<tauri::Wry>>) -> Self {
        Self { store }
    }
}

impl ConfigStore for Config {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        self.store
            .get(key.key_name())
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), String> {
        let val = serde_json::to_value(value).map_err(|e| e.to_string())?;
        self.store.set(key.key_name(), val);
        self.store.save().map_err(|e| e.to_string())?;
        Ok(())
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), String> {
        self.store.delete(key.key_name());
        self.store.save().map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Stored model configuration, or the defaults if nothing was saved yet.
pub fn load_model_config(store: &impl ConfigStore) -> ModelConfig {
    store.get(&ConfigKey::MODEL).unwrap_or_default()
}
