//! tauri-specta wiring: typed commands and events, plus TypeScript export.

use std::path::Path;

use specta_typescript::{BigIntExportBehavior, Typescript};
use tauri_specta::{collect_commands, collect_events, Builder};

use crate::events::{DownloadDiagnostic, DownloadStatusChanged, SpeechStatusChanged};

/// Where debug builds write the generated bindings, relative to `src-tauri`
pub const BINDINGS_PATH: &str = "../ui/bindings.ts";

pub fn builder() -> Builder<tauri::Wry> {
    Builder::<tauri::Wry>::new()
        .commands(crate::with_commands!(collect_commands))
        .events(collect_events![
            DownloadStatusChanged,
            DownloadDiagnostic,
            SpeechStatusChanged,
        ])
}

/// Write TypeScript bindings for every command and event.
/// Byte counts are plain `number`s on the frontend.
pub fn export(builder: &Builder<tauri::Wry>, path: impl AsRef<Path>) -> Result<(), String> {
    builder
        .export(
            Typescript::default().bigint(BigIntExportBehavior::Number),
            path.as_ref(),
        )
        .map_err(|e| e.to_string())
}

pub fn export_bindings(path: impl AsRef<Path>) -> Result<(), String> {
    export(&builder(), path)
}
