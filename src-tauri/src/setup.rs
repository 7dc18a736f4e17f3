use std::path::PathBuf;

use crate::config::{self, Config};
use crate::error::Error;
use crate::runtime::{default_python_root, ModelRuntime, TauriStatusSink};
use log::info;
use menubar_tts_engine::{ControlChannel, Supervisor};
use tauri::{AppHandle, Manager};
use tauri_plugin_store::StoreExt;

/// Generated audio lives under the app data directory
const SPEECH_OUTPUT_DIR: &str = "tts-output";

pub fn setup_app(app: &mut tauri::App<tauri::Wry>) -> Result<(), Box<dyn std::error::Error>> {
    info!("Menubar TTS v{}", env!("CARGO_PKG_VERSION"));

    #[cfg(target_os = "macos")]
    {
        // Menu bar app: no dock icon
        app.set_activation_policy(tauri::ActivationPolicy::Accessory);
    }

    let store = app.store("config.json")?;
    let config = Config::new(store);
    let model_config = config::load_model_config(&config);
    info!("Speech model: {}", model_config.model_id);

    let runtime = ModelRuntime::new(
        config.clone(),
        default_python_root(app.path().resource_dir().ok()),
        speech_output_dir(app.handle())?,
    );

    // ========================================
    // DOWNLOAD SUPERVISOR
    // One task owns the helper process; commands reach it through the
    // control channel and state changes come back as typed events.
    // ========================================
    let (supervisor, handle) = Supervisor::new();
    tauri::async_runtime::spawn(supervisor.run());

    let options_runtime = runtime.clone();
    let control = ControlChannel::new(handle, move || options_runtime.download_options());
    let forwarder = control.forward(TauriStatusSink::new(app.handle().clone()));
    tauri::async_runtime::spawn(forwarder.run());

    app.manage(config);
    app.manage(runtime);
    app.manage(control);

    Ok(())
}

fn speech_output_dir(app: &AppHandle) -> Result<PathBuf, Error> {
    let dir = app.path().app_data_dir()?.join(SPEECH_OUTPUT_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
