//! Download State Machine - single source of truth for valid transitions
//!
//! State diagram:
//! ```text
//! Idle ──Start──> Downloading ──exit 0 / complete──> Completed
//!                   │    ▲  │
//!               [Pause] [Resume]──exit != 0 / spawn error──> Failed ──Retry──┐
//!                   ▼    │  │                                               │
//!                  Paused   └──Cancel──> Canceled ──Retry──> Downloading <──┘
//! ```
//!
//! The machine does no I/O. [`DownloadMachine::step`] takes an event and
//! returns the actions (spawn, kill, notify, diagnostic) that the supervisor
//! task must carry out, so every transition can be exercised without a real
//! process.

use log::{debug, warn};

use super::options::DownloadOptions;
use super::protocol::{OutputLine, OutputParser, ProtocolEvent};
use super::state::{DownloadState, DownloadStatus, ProgressUpdate};
use crate::lines::LineTail;

/// Identifies one spawned helper process.
pub type AttemptId = u64;

/// Number of stderr lines quoted in a failure message
const FAILURE_TAIL_LINES: usize = 3;

/// Which pipe a chunk of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Whether a helper process is associated with the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessSlot {
    #[default]
    Empty,
    Running { attempt: AttemptId },
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// Begin an attempt, optionally with fresh options
    Start(Option<DownloadOptions>),
    /// Forcibly end the current attempt
    Cancel,
    /// Kill and restart with the last options (the payload is only a fallback)
    Retry(Option<DownloadOptions>),
    Pause,
    Resume,
    /// Raw bytes read from the helper
    Output {
        attempt: AttemptId,
        stream: OutputStream,
        chunk: Vec<u8>,
    },
    /// Helper exited; `code` is `None` when killed by a signal
    Exited {
        attempt: AttemptId,
        code: Option<i32>,
    },
    /// Helper could not be launched
    SpawnFailed { attempt: AttemptId, message: String },
}

/// Actions the supervisor should perform after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadAction {
    Spawn {
        attempt: AttemptId,
        options: DownloadOptions,
    },
    Kill { attempt: AttemptId },
    /// Broadcast the new state
    Notify(DownloadState),
    /// Forward a stderr or malformed protocol line
    Diagnostic(String),
}

/// Download lifecycle state plus the bookkeeping of the current attempt.
#[derive(Debug, Default)]
pub struct DownloadMachine {
    state: DownloadState,
    process: ProcessSlot,
    options: Option<DownloadOptions>,
    next_attempt: AttemptId,
    stdout: OutputParser,
    stderr: OutputParser,
    stderr_tail: LineTail,
}

impl DownloadMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DownloadState {
        &self.state
    }

    pub fn process(&self) -> ProcessSlot {
        self.process
    }

    pub fn is_running(&self) -> bool {
        matches!(self.process, ProcessSlot::Running { .. })
    }

    /// Options that the next `retry` would reuse
    pub fn options(&self) -> Option<&DownloadOptions> {
        self.options.as_ref()
    }

    /// Apply an event and return the actions it requires, in order.
    pub fn step(&mut self, event: DownloadEvent) -> Vec<DownloadAction> {
        let mut actions = Vec::new();

        match event {
            DownloadEvent::Start(options) => self.start(options, &mut actions),
            DownloadEvent::Cancel => self.cancel(&mut actions),
            DownloadEvent::Retry(options) => self.retry(options, &mut actions),
            DownloadEvent::Pause => self.pause(&mut actions),
            DownloadEvent::Resume => self.resume(&mut actions),
            DownloadEvent::Output {
                attempt,
                stream,
                chunk,
            } => self.output(attempt, stream, &chunk, &mut actions),
            DownloadEvent::Exited { attempt, code } => self.exited(attempt, code, &mut actions),
            DownloadEvent::SpawnFailed { attempt, message } => {
                if self.is_current(attempt) {
                    self.process = ProcessSlot::Empty;
                    self.fail(
                        format!("Failed to start model download: {}", message),
                        &mut actions,
                    );
                }
            }
        }

        actions
    }

    fn start(&mut self, options: Option<DownloadOptions>, actions: &mut Vec<DownloadAction>) {
        if self.is_running() {
            if self.state.status == DownloadStatus::Paused {
                self.resume(actions);
            } else {
                debug!("Model download already running, start ignored");
            }
            return;
        }

        if options.is_some() {
            self.options = options;
        }
        self.begin_attempt(actions);
    }

    fn cancel(&mut self, actions: &mut Vec<DownloadAction>) {
        if self.state.status == DownloadStatus::Completed {
            debug!("Model download already completed, cancel ignored");
            return;
        }

        self.release_process(actions);
        let next = self.state.with_status(DownloadStatus::Canceled);
        self.replace(next, actions);
    }

    fn retry(&mut self, fallback: Option<DownloadOptions>, actions: &mut Vec<DownloadAction>) {
        self.release_process(actions);
        if self.options.is_none() {
            self.options = fallback;
        }
        self.begin_attempt(actions);
    }

    fn pause(&mut self, actions: &mut Vec<DownloadAction>) {
        if self.state.status == DownloadStatus::Downloading {
            let next = self.state.with_status(DownloadStatus::Paused);
            self.replace(next, actions);
        }
    }

    fn resume(&mut self, actions: &mut Vec<DownloadAction>) {
        if self.state.status == DownloadStatus::Paused {
            let next = self.state.with_status(DownloadStatus::Downloading);
            self.replace(next, actions);
        }
    }

    fn begin_attempt(&mut self, actions: &mut Vec<DownloadAction>) {
        self.replace(DownloadState::downloading(), actions);

        let Some(options) = self.options.clone() else {
            self.fail("No download options supplied".to_string(), actions);
            return;
        };

        let attempt = self.next_attempt;
        self.next_attempt += 1;
        self.process = ProcessSlot::Running { attempt };
        self.stdout = OutputParser::new();
        self.stderr = OutputParser::new();
        self.stderr_tail = LineTail::default();

        actions.push(DownloadAction::Spawn { attempt, options });
    }

    fn release_process(&mut self, actions: &mut Vec<DownloadAction>) {
        if let ProcessSlot::Running { attempt } = std::mem::take(&mut self.process) {
            actions.push(DownloadAction::Kill { attempt });
        }
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        self.process == ProcessSlot::Running { attempt }
    }

    fn output(
        &mut self,
        attempt: AttemptId,
        stream: OutputStream,
        chunk: &[u8],
        actions: &mut Vec<DownloadAction>,
    ) {
        if !self.is_current(attempt) {
            debug!("Dropping {} output from stale attempt {}", stream, attempt);
            return;
        }

        let lines = match stream {
            OutputStream::Stdout => self.stdout.push(chunk),
            OutputStream::Stderr => self.stderr.push(chunk),
        };
        for line in lines {
            self.handle_line(stream, line, actions);
        }
    }

    fn handle_line(
        &mut self,
        stream: OutputStream,
        line: OutputLine,
        actions: &mut Vec<DownloadAction>,
    ) {
        match line {
            OutputLine::Protocol(event) => self.apply_protocol(event, actions),
            OutputLine::Text(text) => match stream {
                OutputStream::Stderr => {
                    self.stderr_tail.push(&text);
                    actions.push(DownloadAction::Diagnostic(text));
                }
                OutputStream::Stdout => debug!("[download stdout] {}", text),
            },
        }
    }

    fn apply_protocol(&mut self, event: ProtocolEvent, actions: &mut Vec<DownloadAction>) {
        if let ProtocolEvent::Malformed(line) = event {
            warn!("Malformed download progress line: {}", line);
            actions.push(DownloadAction::Diagnostic(line));
            return;
        }

        if !self.state.status.accepts_progress() {
            debug!(
                "Ignoring progress event in {} state: {:?}",
                self.state.status, event
            );
            return;
        }

        match event {
            ProtocolEvent::Start { total_bytes } => {
                let mut next = self.state.clone();
                next.total_bytes = total_bytes;
                next.downloaded_bytes = 0;
                next.progress_percent = 0.0;
                self.replace(next, actions);
            }
            ProtocolEvent::File { path, size } => {
                let mut next = self.state.clone();
                next.current_file = Some(path);
                next.current_file_bytes = Some(0);
                next.current_file_total = Some(size);
                self.replace(next, actions);
            }
            ProtocolEvent::Progress(update) => self.update_progress(&update, actions),
            ProtocolEvent::Complete => self.complete(actions),
            ProtocolEvent::Unrecognized => debug!("Unrecognized download progress event"),
            ProtocolEvent::Malformed(_) => {}
        }
    }

    fn update_progress(&mut self, update: &ProgressUpdate, actions: &mut Vec<DownloadAction>) {
        let next = self.state.merged(update);
        self.replace(next, actions);
    }

    fn exited(&mut self, attempt: AttemptId, code: Option<i32>, actions: &mut Vec<DownloadAction>) {
        if !self.is_current(attempt) {
            debug!("Ignoring exit of stale attempt {} ({:?})", attempt, code);
            return;
        }

        // Lines without a trailing newline still count.
        if let Some(line) = self.stdout.finish() {
            self.handle_line(OutputStream::Stdout, line, actions);
        }
        if let Some(line) = self.stderr.finish() {
            self.handle_line(OutputStream::Stderr, line, actions);
        }
        self.process = ProcessSlot::Empty;

        let status = self.state.status;
        match code {
            Some(0) => {
                if matches!(
                    status,
                    DownloadStatus::Failed | DownloadStatus::Canceled | DownloadStatus::Completed
                ) {
                    return;
                }
                self.complete(actions);
            }
            other => {
                if matches!(status, DownloadStatus::Canceled | DownloadStatus::Completed) {
                    return;
                }
                let message = self.exit_message(other);
                self.fail(message, actions);
            }
        }
    }

    fn exit_message(&self, code: Option<i32>) -> String {
        if let Some(tail) = self.stderr_tail.last(FAILURE_TAIL_LINES) {
            return tail;
        }
        match code {
            Some(code) => format!("Model download exited with code {}", code),
            None => "Model download process was terminated by a signal".to_string(),
        }
    }

    fn fail(&mut self, message: String, actions: &mut Vec<DownloadAction>) {
        let message = match message.trim() {
            "" => "Model download failed".to_string(),
            trimmed => trimmed.to_string(),
        };
        warn!("Model download failed: {}", message);

        let mut next = self.state.with_status(DownloadStatus::Failed);
        next.error = Some(message);
        self.replace(next, actions);
    }

    fn complete(&mut self, actions: &mut Vec<DownloadAction>) {
        let mut next = self.state.with_status(DownloadStatus::Completed);
        next.eta_seconds = None;
        self.replace(next, actions);
    }

    /// Swap in the next state and notify, keeping the cross-field invariants.
    fn replace(&mut self, mut next: DownloadState, actions: &mut Vec<DownloadAction>) {
        if next.status != DownloadStatus::Failed {
            next.error = None;
        }
        if next.status == DownloadStatus::Completed {
            next.progress_percent = 100.0;
        }

        if next != self.state {
            self.state = next.clone();
            actions.push(DownloadAction::Notify(next));
        }
    }
}
