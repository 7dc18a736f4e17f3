use std::path::{Path, PathBuf};

use log::{error, warn};
use menubar_tts_engine::{
    DownloadOptions, DownloadState, PythonRuntime, SpeechGenerator, StatusSink,
};
use tauri::AppHandle;
use tauri_specta::Event;

use crate::config::{self, Config, ModelConfig};
use crate::events::{DownloadDiagnostic, DownloadStatusChanged};

/// Overrides the python root in every build
pub const PYTHON_ROOT_ENV: &str = "MENUBAR_TTS_ROOT";
/// Bundled python engine, relative to the resource directory
const BUNDLED_ENGINE_DIR: &str = "python-engine";

/// Resolves where the python engine lives and builds per-request runners
/// from the current configuration.
#[derive(Clone)]
pub struct ModelRuntime {
    config: Config,
    default_root: Option<PathBuf>,
    output_dir: PathBuf,
}

impl ModelRuntime {
    pub fn new(config: Config, default_root: Option<PathBuf>, output_dir: PathBuf) -> Self {
        Self {
            config,
            default_root,
            output_dir,
        }
    }

    pub fn model_config(&self) -> ModelConfig {
        config::load_model_config(&self.config)
    }

    pub fn python(&self, model_config: &ModelConfig) -> Option<PythonRuntime> {
        let root = resolve_python_root(
            model_config.python_root.as_deref(),
            std::env::var(PYTHON_ROOT_ENV).ok(),
            self.default_root.as_deref(),
        );
        if root.is_none() {
            warn!("No python engine directory configured");
        }
        root.map(PythonRuntime::new)
    }

    /// Options for the next download attempt, read fresh from the store.
    pub fn download_options(&self) -> Option<DownloadOptions> {
        let model_config = self.model_config();
        self.python(&model_config).map(|python| {
            python.download_options(&model_config.model_id, model_config.revision.clone())
        })
    }

    pub fn speech_generator(&self) -> Option<SpeechGenerator> {
        let model_config = self.model_config();
        self.python(&model_config).map(|python| {
            SpeechGenerator::new(python, model_config.model_id, self.output_dir.clone())
        })
    }
}

/// Default python root for this build: the repository checkout in debug
/// builds, the bundled engine in release builds.
pub fn default_python_root(resource_dir: Option<PathBuf>) -> Option<PathBuf> {
    if cfg!(debug_assertions) {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .map(Path::to_path_buf)
    } else {
        resource_dir.map(|dir| dir.join(BUNDLED_ENGINE_DIR))
    }
}

/// Configured root, then the environment override, then the build default.
/// Blank values are skipped.
fn resolve_python_root(
    configured: Option<&str>,
    env: Option<String>,
    default: Option<&Path>,
) -> Option<PathBuf> {
    configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            env.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
        })
        .or_else(|| default.map(Path::to_path_buf))
}

/// Pushes supervisor notifications to the webview as typed events.
pub struct TauriStatusSink {
    app: AppHandle,
}

impl TauriStatusSink {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl StatusSink for TauriStatusSink {
    fn send_status(&self, state: &DownloadState) {
        if let Err(e) = DownloadStatusChanged(state.clone()).emit(&self.app) {
            error!("Failed to emit DownloadStatusChanged: {}", e);
        }
    }

    fn send_diagnostic(&self, line: &str) {
        let event = DownloadDiagnostic {
            line: line.to_string(),
        };
        if let Err(e) = event.emit(&self.app) {
            error!("Failed to emit DownloadDiagnostic: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_python_root_precedence() {
        let default = Path::new("/app/python-engine");
        let test_cases = vec![
            (
                "configured root wins",
                Some("/custom"),
                Some("/from-env".to_string()),
                Some(default),
                Some(PathBuf::from("/custom")),
            ),
            (
                "environment when not configured",
                None,
                Some("/from-env".to_string()),
                Some(default),
                Some(PathBuf::from("/from-env")),
            ),
            (
                "blank values are skipped",
                Some("  "),
                Some("".to_string()),
                Some(default),
                Some(PathBuf::from("/app/python-engine")),
            ),
            ("nothing available", None, None, None, None),
        ];

        for (description, configured, env, default, expected) in test_cases {
            assert_eq!(
                resolve_python_root(configured, env, default),
                expected,
                "{}",
                description
            );
        }
    }
}
