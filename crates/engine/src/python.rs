use std::path::{Path, PathBuf};

use crate::download::DownloadOptions;

/// Fallback interpreter looked up on `PATH`
pub const SYSTEM_PYTHON: &str = "python3";
/// Helper script that downloads model weights, relative to the python root
pub const DOWNLOAD_SCRIPT: &str = "download_model.py";

#[cfg(windows)]
const VENV_PYTHON: &[&str] = &[".venv", "Scripts", "python.exe"];
#[cfg(not(windows))]
const VENV_PYTHON: &[&str] = &[".venv", "bin", "python"];

/// Locates the python interpreter and helper scripts under one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonRuntime {
    root: PathBuf,
}

impl PythonRuntime {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The project virtualenv interpreter if present, otherwise `python3`.
    pub fn executable(&self) -> PathBuf {
        let venv = VENV_PYTHON
            .iter()
            .fold(self.root.clone(), |path, part| path.join(part));
        if venv.is_file() {
            venv
        } else {
            PathBuf::from(SYSTEM_PYTHON)
        }
    }

    pub fn download_script(&self) -> PathBuf {
        self.root.join(DOWNLOAD_SCRIPT)
    }

    pub fn download_options(&self, model_id: &str, revision: Option<String>) -> DownloadOptions {
        DownloadOptions::new(
            self.executable(),
            self.download_script(),
            model_id,
            &self.root,
        )
        .with_revision(revision)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn falls_back_to_system_python_without_venv() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = PythonRuntime::new(dir.path());

        assert_eq!(runtime.executable(), PathBuf::from("python3"));
    }

    #[test]
    fn prefers_venv_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let venv = VENV_PYTHON
            .iter()
            .fold(dir.path().to_path_buf(), |path, part| path.join(part));
        fs::create_dir_all(venv.parent().unwrap()).unwrap();
        fs::write(&venv, "").unwrap();

        let runtime = PythonRuntime::new(dir.path());

        assert_eq!(runtime.executable(), venv);
    }

    #[test]
    fn download_options_run_script_from_root() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = PythonRuntime::new(dir.path());

        let options = runtime.download_options("org/model", Some("main".to_string()));

        assert_eq!(options.script, dir.path().join("download_model.py"));
        assert_eq!(options.working_dir, dir.path());
        assert_eq!(options.model_id, "org/model");
        assert_eq!(options.revision.as_deref(), Some("main"));
    }
}
