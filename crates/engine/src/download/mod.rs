//! Model download lifecycle: protocol parsing, the transition function and
//! the task that owns the helper process.

mod machine;
mod options;
mod protocol;
mod state;
mod supervisor;

pub use machine::{
    AttemptId, DownloadAction, DownloadEvent, DownloadMachine, OutputStream, ProcessSlot,
};
pub use options::DownloadOptions;
pub use protocol::{parse_line, OutputLine, OutputParser, ProtocolEvent, PROTOCOL_PREFIX};
pub use state::{DownloadState, DownloadStatus, ProgressUpdate};
pub use supervisor::{Supervisor, SupervisorEvent, SupervisorHandle};
