use menubar_tts_engine::{ControlChannel, ControlRequest, DownloadState};
use tauri::State;

// ===== MODEL DOWNLOAD COMMANDS =====
//
// Requests are fire-and-forget; the resulting state arrives as a
// DownloadStatusChanged event.

/// Start downloading the configured model. Ignored while a download runs.
#[tauri::command]
#[specta::specta]
pub fn start_model_download(control: State<ControlChannel>) {
    control.handle(ControlRequest::Start);
}

/// Stop the running download
#[tauri::command]
#[specta::specta]
pub fn cancel_model_download(control: State<ControlChannel>) {
    control.handle(ControlRequest::Cancel);
}

/// Restart the download with the options of the last attempt
#[tauri::command]
#[specta::specta]
pub fn retry_model_download(control: State<ControlChannel>) {
    control.handle(ControlRequest::Retry);
}

/// Hide progress as paused. The download itself keeps running.
#[tauri::command]
#[specta::specta]
pub fn pause_model_download(control: State<ControlChannel>) {
    control.handle(ControlRequest::Pause);
}

#[tauri::command]
#[specta::specta]
pub fn resume_model_download(control: State<ControlChannel>) {
    control.handle(ControlRequest::Resume);
}

/// Current download state, for views opened after the last event
#[tauri::command]
#[specta::specta]
pub fn get_model_download_state(control: State<ControlChannel>) -> DownloadState {
    control.state()
}
