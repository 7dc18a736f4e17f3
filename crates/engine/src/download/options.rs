use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to launch the download helper for one attempt.
///
/// The helper is invoked as `<executable> <script> --model <id>` in
/// `working_dir`, inheriting the parent environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    pub executable: PathBuf,
    pub script: PathBuf,
    pub model_id: String,
    pub working_dir: PathBuf,
    /// Optional repository revision (branch, tag or commit)
    #[serde(default)]
    pub revision: Option<String>,
}

impl DownloadOptions {
    pub fn new(
        executable: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
        model_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            script: script.into(),
            model_id: model_id.into(),
            working_dir: working_dir.into(),
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision.filter(|r| !r.trim().is_empty());
        self
    }

    /// Arguments passed after the executable.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![
            self.script.clone().into_os_string(),
            OsString::from("--model"),
            OsString::from(&self.model_id),
        ];
        if let Some(revision) = &self.revision {
            args.push(OsString::from("--revision"));
            args.push(OsString::from(revision));
        }
        args
    }
}
