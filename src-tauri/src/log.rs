use log::LevelFilter;
use tauri_plugin_log::{Target, TargetKind};

/// Log file name inside the platform log directory
const LOG_FILE_NAME: &str = "menubar-tts";

/// Creates the logging plugin.
///
/// Logs go to stdout, a file in the log directory and the webview console.
/// Debug builds log at Debug, release builds at Info. Helper process output
/// is logged at Debug by the engine, so it only shows up in development.
pub fn create_plugin() -> tauri_plugin_log::Builder {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    tauri_plugin_log::Builder::new()
        .targets([
            Target::new(TargetKind::Stdout),
            Target::new(TargetKind::LogDir {
                file_name: Some(LOG_FILE_NAME.to_string()),
            }),
            Target::new(TargetKind::Webview),
        ])
        .level(level)
        // Window event loop chatter
        .level_for("tao", LevelFilter::Warn)
}
