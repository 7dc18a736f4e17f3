//! Typesafe events emitted to the frontend.
//!
//! These events are emitted from Rust and can be listened to in TypeScript
//! with full type safety via tauri-specta.

use menubar_tts_engine::DownloadState;
use serde::{Deserialize, Serialize};

/// Full model download state, pushed on every transition
#[derive(Debug, Clone, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
pub struct DownloadStatusChanged(pub DownloadState);

/// A line of helper output that is not part of the progress protocol
#[derive(Debug, Clone, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
pub struct DownloadDiagnostic {
    pub line: String,
}

/// Progress text from a running speech generation
#[derive(Debug, Clone, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
pub struct SpeechStatusChanged {
    pub status: String,
}
