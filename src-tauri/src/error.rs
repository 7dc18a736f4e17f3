use derive_more::{Display, From};

#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    Tauri(tauri::Error),

    #[from]
    Store(tauri_plugin_store::Error),

    #[from]
    Io(std::io::Error),
}

impl std::error::Error for Error {}
