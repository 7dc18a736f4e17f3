use log::{error, warn};
use menubar_tts_engine::{SpeechOutput, SpeechRequest};
use tauri::State;
use tauri_specta::Event;

use crate::events::SpeechStatusChanged;
use crate::runtime::ModelRuntime;

/// Generate speech for `request`. Progress is reported through
/// SpeechStatusChanged events; errors come back as user-facing text.
#[tauri::command]
#[specta::specta]
pub async fn generate_speech(
    runtime: State<'_, ModelRuntime>,
    app: tauri::AppHandle,
    request: SpeechRequest,
) -> Result<SpeechOutput, String> {
    let generator = runtime
        .speech_generator()
        .ok_or_else(|| "Speech engine not found. Set the Python engine folder.".to_string())?;

    let on_status = |status: &str| {
        let event = SpeechStatusChanged {
            status: status.to_string(),
        };
        if let Err(e) = event.emit(&app) {
            warn!("Failed to emit SpeechStatusChanged: {}", e);
        }
    };

    generator.generate(&request, on_status).await.map_err(|e| {
        error!("Speech generation failed: {}", e);
        e.user_message()
    })
}
