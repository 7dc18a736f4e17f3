use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::machine::{AttemptId, DownloadAction, DownloadEvent, DownloadMachine, OutputStream};
use super::options::DownloadOptions;
use super::state::DownloadState;
use crate::error::SupervisorError;

const EVENT_CAPACITY: usize = 256;
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Notification published by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// Full state after a transition
    StateChanged(DownloadState),
    /// Non-protocol stderr line or malformed protocol line
    Diagnostic(String),
}

enum Request {
    Control(DownloadEvent),
    /// Carries an optional sender that fires once a live helper is reaped.
    Shutdown(Option<oneshot::Sender<()>>),
}

/// The one live helper process owned by the supervisor.
struct RunningProcess {
    attempt: AttemptId,
    pid: Option<u32>,
    kill: oneshot::Sender<oneshot::Sender<()>>,
}

impl RunningProcess {
    /// Ask the watcher task to kill the child. The returned receiver resolves
    /// once the child has been reaped, or errors if the watcher is gone.
    fn kill(self) -> oneshot::Receiver<()> {
        info!(
            "Killing model download process (attempt {}, pid {:?})",
            self.attempt, self.pid
        );
        let (reaped_tx, reaped_rx) = oneshot::channel();
        let _ = self.kill.send(reaped_tx);
        reaped_rx
    }
}

/// Owns the download state machine and at most one helper process.
///
/// All transitions run sequentially on the task executing [`Supervisor::run`];
/// callers talk to it through a cloneable [`SupervisorHandle`].
pub struct Supervisor {
    machine: DownloadMachine,
    process: Option<RunningProcess>,
    commands: mpsc::UnboundedReceiver<Request>,
    process_tx: mpsc::UnboundedSender<DownloadEvent>,
    process_rx: mpsc::UnboundedReceiver<DownloadEvent>,
    state_tx: watch::Sender<DownloadState>,
    events_tx: broadcast::Sender<SupervisorEvent>,
}

impl Supervisor {
    /// Create an idle supervisor and a handle to it. The supervisor does
    /// nothing until [`Supervisor::run`] is polled.
    pub fn new() -> (Self, SupervisorHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (process_tx, process_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(DownloadState::idle());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let handle = SupervisorHandle {
            commands: commands_tx,
            state: state_rx,
            events: events_tx.clone(),
        };

        let supervisor = Self {
            machine: DownloadMachine::new(),
            process: None,
            commands,
            process_tx,
            process_rx,
            state_tx,
            events_tx,
        };

        (supervisor, handle)
    }

    /// Spawn the supervisor on the current tokio runtime.
    pub fn spawn() -> SupervisorHandle {
        let (supervisor, handle) = Self::new();
        tokio::spawn(supervisor.run());
        handle
    }

    /// Main control loop. Returns after `shutdown` or once every handle is
    /// dropped; a live helper is killed and reaped on the way out.
    pub async fn run(mut self) {
        info!("Model download supervisor started");

        let done = loop {
            let event = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Request::Control(event)) => event,
                    Some(Request::Shutdown(done)) => break done,
                    None => break None,
                },
                Some(event) = self.process_rx.recv() => event,
            };
            self.dispatch(event);
        };

        if let Some(process) = self.process.take() {
            // Errors when the child already exited on its own.
            let _ = process.kill().await;
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
        info!("Model download supervisor stopped");
    }

    fn dispatch(&mut self, event: DownloadEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            if let DownloadEvent::Exited { attempt, .. } = &event {
                if self.process.as_ref().is_some_and(|p| p.attempt == *attempt) {
                    self.process = None;
                }
            }

            for action in self.machine.step(event) {
                match action {
                    DownloadAction::Notify(state) => {
                        debug!(
                            "Model download state: {} ({:.1}%)",
                            state.status, state.progress_percent
                        );
                        self.state_tx.send_replace(state.clone());
                        // No receivers is fine: late subscribers only see future changes.
                        let _ = self.events_tx.send(SupervisorEvent::StateChanged(state));
                    }
                    DownloadAction::Diagnostic(line) => {
                        debug!("[download stderr] {}", line);
                        let _ = self.events_tx.send(SupervisorEvent::Diagnostic(line));
                    }
                    DownloadAction::Kill { attempt } => self.kill(attempt),
                    DownloadAction::Spawn { attempt, options } => {
                        if let Err(e) = self.spawn_process(attempt, &options) {
                            error!("Failed to spawn model download process: {}", e);
                            pending.push_back(DownloadEvent::SpawnFailed {
                                attempt,
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    fn kill(&mut self, attempt: AttemptId) {
        match self.process.take() {
            Some(process) if process.attempt == attempt => {
                // Never wait here; a late exit is dropped by its attempt id.
                let _ = process.kill();
            }
            other => {
                debug!("No live process for attempt {}, nothing to kill", attempt);
                self.process = other;
            }
        }
    }

    fn spawn_process(
        &mut self,
        attempt: AttemptId,
        options: &DownloadOptions,
    ) -> std::io::Result<()> {
        info!(
            "Spawning model download: {:?} {:?} (cwd {:?})",
            options.executable,
            options.args(),
            options.working_dir
        );

        let child = Command::new(&options.executable)
            .args(options.args())
            .current_dir(&options.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_child(child, attempt, kill_rx, self.process_tx.clone()));

        if let Some(previous) = self.process.replace(RunningProcess {
            attempt,
            pid,
            kill: kill_tx,
        }) {
            let _ = previous.kill();
        }

        Ok(())
    }
}

/// Owns the child for one attempt: pumps its output, then reports the exit
/// once both pipes are drained so protocol lines always precede it.
async fn watch_child(
    mut child: Child,
    attempt: AttemptId,
    kill: oneshot::Receiver<oneshot::Sender<()>>,
    events: mpsc::UnboundedSender<DownloadEvent>,
) {
    let pumps: Vec<_> = [
        child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, attempt, OutputStream::Stdout, events.clone()))),
        child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump(err, attempt, OutputStream::Stderr, events.clone()))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut killed = false;
    let status = tokio::select! {
        status = child.wait() => status,
        reaped = kill => {
            killed = true;
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill model download process: {}", e);
            }
            let status = child.wait().await;
            if let Ok(reaped) = reaped {
                let _ = reaped.send(());
            }
            status
        }
    };

    for pump in pumps {
        if killed {
            // A grandchild may still hold the pipes open.
            pump.abort();
        } else {
            let _ = pump.await;
        }
    }

    let code = match status {
        Ok(status) => {
            info!("Model download process exited: {} (attempt {})", status, attempt);
            status.code()
        }
        Err(e) => {
            error!("Failed to wait for model download process: {}", e);
            None
        }
    };

    let _ = events.send(DownloadEvent::Exited { attempt, code });
}

async fn pump<R>(
    mut reader: R,
    attempt: AttemptId,
    stream: OutputStream,
    events: mpsc::UnboundedSender<DownloadEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => {
                let event = DownloadEvent::Output {
                    attempt,
                    stream,
                    chunk: buffer[..read].to_vec(),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read model download {}: {}", stream, e);
                break;
            }
        }
    }
}

/// Cloneable handle to a running [`Supervisor`].
///
/// Control methods enqueue a request and return immediately; results arrive
/// as state-change notifications.
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<DownloadState>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl SupervisorHandle {
    /// Start an attempt with fresh options, or with the last ones if `None`.
    pub fn start(&self, options: Option<DownloadOptions>) {
        self.send(DownloadEvent::Start(options));
    }

    pub fn cancel(&self) {
        self.send(DownloadEvent::Cancel);
    }

    /// Kill any live helper and start again with the last options.
    /// `fallback` is only used if no options were ever supplied.
    pub fn retry(&self, fallback: Option<DownloadOptions>) {
        self.send(DownloadEvent::Retry(fallback));
    }

    pub fn pause(&self) {
        self.send(DownloadEvent::Pause);
    }

    pub fn resume(&self) {
        self.send(DownloadEvent::Resume);
    }

    /// Stop the supervisor task and kill any live helper. Returns before
    /// the kill happens.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Request::Shutdown(None));
    }

    /// Stop the supervisor task and wait until a live helper has been killed
    /// and reaped. Use this when the process exits right afterwards.
    pub async fn shutdown_and_wait(&self, limit: Duration) -> Result<(), SupervisorError> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Request::Shutdown(Some(done_tx))).is_err() {
            debug!("Model download supervisor already stopped");
            return Ok(());
        }
        // A dropped sender means the supervisor task is gone, and its child with it.
        tokio::time::timeout(limit, done_rx)
            .await
            .map(|_| ())
            .map_err(|_| SupervisorError::ShutdownTimedOut(limit))
    }

    /// Latest state snapshot.
    pub fn state(&self) -> DownloadState {
        self.state.borrow().clone()
    }

    /// Single-slot view of the latest state.
    pub fn watch(&self) -> watch::Receiver<DownloadState> {
        self.state.clone()
    }

    /// Receive every future notification. Nothing is replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Wait until the state satisfies `predicate` (checked against the
    /// current state first).
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<DownloadState, SupervisorError>
    where
        F: FnMut(&DownloadState) -> bool,
    {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| SupervisorError::Closed)?;
        Ok((*matched).clone())
    }

    fn send(&self, event: DownloadEvent) {
        if self.commands.send(Request::Control(event)).is_err() {
            warn!("Model download supervisor is not running, request dropped");
        }
    }
}
