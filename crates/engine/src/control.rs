//! Request/response boundary between a UI and the download supervisor.
//!
//! Requests are fire-and-forget: they never fail across the channel, and the
//! outcome shows up as a status notification on [`STATUS_CHANNEL`].

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use crate::download::{DownloadOptions, DownloadState, SupervisorEvent, SupervisorHandle};

/// Channel on which every state change is pushed.
pub const STATUS_CHANNEL: &str = "model:download:status";

/// Control operations, named by the channel they arrive on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum ControlRequest {
    #[strum(serialize = "model:download:start")]
    Start,
    #[strum(serialize = "model:download:pause")]
    Pause,
    #[strum(serialize = "model:download:resume")]
    Resume,
    #[strum(serialize = "model:download:cancel")]
    Cancel,
    #[strum(serialize = "model:download:retry")]
    Retry,
}

/// The one observer that receives pushed status updates.
pub trait StatusSink: Send + Sync + 'static {
    fn send_status(&self, state: &DownloadState);

    fn send_diagnostic(&self, _line: &str) {}
}

/// Supplies download options at the moment a request is handled, so
/// configuration changes apply to the next attempt without re-registering.
pub trait OptionsProvider: Send + Sync + 'static {
    fn download_options(&self) -> Option<DownloadOptions>;
}

impl<F> OptionsProvider for F
where
    F: Fn() -> Option<DownloadOptions> + Send + Sync + 'static,
{
    fn download_options(&self) -> Option<DownloadOptions> {
        self()
    }
}

#[derive(Clone)]
pub struct ControlChannel {
    supervisor: SupervisorHandle,
    options: Arc<dyn OptionsProvider>,
}

impl ControlChannel {
    pub fn new(supervisor: SupervisorHandle, options: impl OptionsProvider) -> Self {
        Self {
            supervisor,
            options: Arc::new(options),
        }
    }

    /// Dispatch a request received on its named channel.
    pub fn handle(&self, request: ControlRequest) {
        debug!("Control request: {}", request);
        match request {
            ControlRequest::Start => self.start(),
            ControlRequest::Pause => self.pause(),
            ControlRequest::Resume => self.resume(),
            ControlRequest::Cancel => self.cancel(),
            ControlRequest::Retry => self.retry(),
        }
    }

    pub fn start(&self) {
        self.supervisor.start(self.options.download_options());
    }

    /// Retry with the options of the last attempt. The provider is only
    /// consulted as a fallback when nothing was started before.
    pub fn retry(&self) {
        self.supervisor.retry(self.options.download_options());
    }

    pub fn cancel(&self) {
        self.supervisor.cancel();
    }

    pub fn pause(&self) {
        self.supervisor.pause();
    }

    pub fn resume(&self) {
        self.supervisor.resume();
    }

    pub fn state(&self) -> DownloadState {
        self.supervisor.state()
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    /// Build the task that relays supervisor notifications to `sink`.
    /// Poll [`StatusForwarder::run`] to start forwarding.
    pub fn forward<S: StatusSink>(&self, sink: S) -> StatusForwarder<S> {
        StatusForwarder {
            sink,
            events: self.supervisor.subscribe(),
            latest: self.supervisor.watch(),
        }
    }
}

pub struct StatusForwarder<S> {
    sink: S,
    events: broadcast::Receiver<SupervisorEvent>,
    latest: watch::Receiver<DownloadState>,
}

impl<S: StatusSink> StatusForwarder<S> {
    /// Forward until the supervisor stops.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => match event {
                    Ok(SupervisorEvent::StateChanged(state)) => self.sink.send_status(&state),
                    Ok(SupervisorEvent::Diagnostic(line)) => self.sink.send_diagnostic(&line),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Status forwarder lagged by {} events, resending latest state", skipped);
                        let latest = self.latest.borrow().clone();
                        self.sink.send_status(&latest);
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = self.latest.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Status forwarder stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;
    use tokio::sync::mpsc;

    use super::*;
    use crate::download::{DownloadStatus, Supervisor};

    #[test]
    fn request_names_match_channels() {
        let test_cases = vec![
            (ControlRequest::Start, "model:download:start"),
            (ControlRequest::Pause, "model:download:pause"),
            (ControlRequest::Resume, "model:download:resume"),
            (ControlRequest::Cancel, "model:download:cancel"),
            (ControlRequest::Retry, "model:download:retry"),
        ];

        for (request, channel) in test_cases {
            assert_eq!(request.to_string(), channel);
            assert_eq!(ControlRequest::from_str(channel).unwrap(), request);
        }

        assert_eq!(ControlRequest::iter().count(), 5);
        assert!(ControlRequest::from_str("model:download:status").is_err());
    }

    struct ChannelSink(mpsc::UnboundedSender<DownloadStatus>);

    impl StatusSink for ChannelSink {
        fn send_status(&self, state: &DownloadState) {
            let _ = self.0.send(state.status);
        }
    }

    #[tokio::test]
    async fn start_without_options_is_reported_to_the_sink() {
        let handle = Supervisor::spawn();
        let channel = ControlChannel::new(handle, || -> Option<DownloadOptions> { None });
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(channel.forward(ChannelSink(tx)).run());

        channel.handle(ControlRequest::Start);

        assert_eq!(rx.recv().await, Some(DownloadStatus::Downloading));
        assert_eq!(rx.recv().await, Some(DownloadStatus::Failed));
        assert_eq!(
            channel.state().error.as_deref(),
            Some("No download options supplied")
        );

        channel.handle(ControlRequest::Cancel);
        assert_eq!(rx.recv().await, Some(DownloadStatus::Canceled));

        // Neither changes the state, so nothing more is pushed.
        channel.handle(ControlRequest::Cancel);
        channel.handle(ControlRequest::Pause);
        channel.supervisor().shutdown();
        assert_eq!(rx.recv().await, None, "forwarder stops with the supervisor");
    }
}
