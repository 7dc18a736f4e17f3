//! Core of the menu-bar TTS app, free of any UI toolkit.
//!
//! - [`download`] supervises the helper process that fetches model weights
//!   and turns its output into a typed [`DownloadState`].
//! - [`control`] exposes the supervisor as named requests plus one pushed
//!   status stream.
//! - [`tts`] runs the speech model once per request.
//!
//! # Example
//!
//! ```no_run
//! use menubar_tts_engine::{PythonRuntime, Supervisor, DEFAULT_MODEL_ID};
//!
//! # async fn run() {
//! let python = PythonRuntime::new("/opt/menubar-tts");
//! let downloads = Supervisor::spawn();
//! downloads.start(Some(python.download_options(DEFAULT_MODEL_ID, None)));
//!
//! let state = downloads.wait_until(|s| s.status.is_terminal()).await;
//! println!("{:?}", state);
//! # }
//! ```

pub mod control;
pub mod download;
pub mod error;
pub mod lines;
pub mod python;
pub mod tts;

pub use control::{ControlChannel, ControlRequest, OptionsProvider, StatusForwarder, StatusSink, STATUS_CHANNEL};
pub use download::{DownloadOptions, DownloadState, DownloadStatus, Supervisor, SupervisorEvent, SupervisorHandle};
pub use error::{SpeechError, SupervisorError};
pub use python::PythonRuntime;
pub use tts::{SpeechGenerator, SpeechOutput, SpeechRequest};

/// Speech model used when none is configured.
pub const DEFAULT_MODEL_ID: &str = "mlx-community/Qwen3-TTS-12Hz-0.6B-Base-6bit";
