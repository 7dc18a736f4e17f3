mod bindings;
mod commands;
mod config;
mod error;
mod events;
mod log;
mod runtime;
mod setup;

use std::time::Duration;

use menubar_tts_engine::ControlChannel;
use tauri::{Manager, RunEvent};

/// Upper bound on how long quitting waits for the download helper to die
const EXIT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

pub use bindings::export_bindings;

pub fn run() {
    let builder = bindings::builder();

    #[cfg(debug_assertions)]
    if let Err(e) = bindings::export(&builder, bindings::BINDINGS_PATH) {
        eprintln!("Failed to export TypeScript bindings: {}", e);
    }

    let app = tauri::Builder::default()
        .plugin(log::create_plugin().build())
        .plugin(tauri_plugin_store::Builder::new().build())
        .invoke_handler(builder.invoke_handler())
        .setup(move |app| {
            builder.mount_events(app);
            setup::setup_app(app)
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| {
        if let RunEvent::Exit = event {
            // The process exits as soon as this returns, so block until a
            // running download helper has been killed and reaped.
            if let Some(control) = app_handle.try_state::<ControlChannel>() {
                let supervisor = control.supervisor().clone();
                let stopped = tauri::async_runtime::block_on(async move {
                    supervisor.shutdown_and_wait(EXIT_SHUTDOWN_TIMEOUT).await
                });
                if let Err(e) = stopped {
                    ::log::error!("{}", e);
                }
            }
        }
    });
}
