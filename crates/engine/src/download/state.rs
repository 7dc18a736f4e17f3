use serde::{Deserialize, Serialize};

/// Lifecycle status of a model download attempt.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DownloadStatus {
    #[default]
    Idle,
    Downloading,
    /// UI-level pause. The helper process keeps running.
    Paused,
    Completed,
    Failed,
    Canceled,
}

impl DownloadStatus {
    /// Completed, failed or canceled: only `retry` (or a fresh `start`)
    /// moves the machine forward from here.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Progress samples are only merged while an attempt is underway.
    pub fn accepts_progress(self) -> bool {
        matches!(self, Self::Downloading | Self::Paused)
    }
}

/// Full observable download state, sent to the frontend on every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct DownloadState {
    pub status: DownloadStatus,
    /// 0..=100, monotonic within one attempt
    pub progress_percent: f64,
    pub downloaded_bytes: u64,
    /// 0 while the total is unknown
    pub total_bytes: u64,
    pub eta_seconds: Option<u64>,
    pub current_file: Option<String>,
    pub current_file_bytes: Option<u64>,
    pub current_file_total: Option<u64>,
    /// Set only while `status` is `failed`
    pub error: Option<String>,
}

impl DownloadState {
    pub fn idle() -> Self {
        Self::default()
    }

    /// A clean slate for a new attempt.
    pub(crate) fn downloading() -> Self {
        Self {
            status: DownloadStatus::Downloading,
            ..Self::default()
        }
    }

    pub(crate) fn with_status(&self, status: DownloadStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Merge a progress sample into a copy of this state.
    pub(crate) fn merged(&self, update: &ProgressUpdate) -> Self {
        let mut next = self.clone();
        if next.status != DownloadStatus::Paused {
            next.status = DownloadStatus::Downloading;
        }

        next.progress_percent = update.percent.clamp(0.0, 100.0).max(self.progress_percent);
        next.downloaded_bytes = update.downloaded_bytes;
        if update.total_bytes > 0 {
            next.total_bytes = update.total_bytes;
        }
        next.eta_seconds = update.eta_seconds;

        if update.current_file.is_some() {
            next.current_file = update.current_file.clone();
        }
        if update.current_file_bytes.is_some() {
            next.current_file_bytes = update.current_file_bytes;
        }
        if update.current_file_total.is_some() {
            next.current_file_total = update.current_file_total;
        }

        next
    }
}

/// One progress sample reported by the download helper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub eta_seconds: Option<u64>,
    pub current_file: Option<String>,
    pub current_file_bytes: Option<u64>,
    pub current_file_total: Option<u64>,
}
