//! One-shot speech generation through `mlx_audio.tts.generate`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use uuid::Uuid;

use crate::error::SpeechError;
use crate::lines::{LineBuffer, LineTail};
use crate::python::PythonRuntime;

pub const WAV_MIME_TYPE: &str = "audio/wav";
/// Stderr lines kept for the failure report
const STDERR_TAIL_LINES: usize = 32;

static STAGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(Downloading|Resolving|Fetching|Loading)\b").expect("valid regex")
});
static PERCENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}%").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Option<String>,
    pub speed: Option<f64>,
    pub pitch: Option<f64>,
    pub gender: Option<String>,
    pub instruct: Option<String>,
    /// Reference clip for voice cloning
    pub ref_audio_path: Option<String>,
    /// Transcript of the reference clip
    pub ref_text: Option<String>,
    pub exaggeration: Option<f64>,
    pub cfg_scale: Option<f64>,
    pub ddpm_steps: Option<u32>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct SpeechOutput {
    pub audio_path: String,
    pub mime_type: String,
    pub duration_ms: u64,
}

/// Runs the speech model once per request and collects the written WAV file.
#[derive(Debug, Clone)]
pub struct SpeechGenerator {
    python: PythonRuntime,
    model_id: String,
    output_dir: PathBuf,
}

impl SpeechGenerator {
    pub fn new(python: PythonRuntime, model_id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            python,
            model_id: model_id.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Interpreter arguments for one request. Optional flags are only passed
    /// when set (and non-blank for text values).
    pub fn command_args(&self, request: &SpeechRequest, file_prefix: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-m",
            "mlx_audio.tts.generate",
            "--model",
            self.model_id.as_str(),
            "--text",
            request.text.as_str(),
            "--file_prefix",
            file_prefix,
            "--audio_format",
            "wav",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        let mut flag = |name: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                args.push(OsString::from(name));
                args.push(OsString::from(value));
            }
        };

        flag("--voice", request.voice.clone());
        flag("--gender", request.gender.clone());
        flag("--instruct", request.instruct.clone());
        flag("--speed", request.speed.map(|v| v.to_string()));
        flag("--pitch", request.pitch.map(|v| v.to_string()));
        flag("--exaggeration", request.exaggeration.map(|v| v.to_string()));
        flag("--cfg_scale", request.cfg_scale.map(|v| v.to_string()));
        flag("--ddpm_steps", request.ddpm_steps.map(|v| v.to_string()));
        flag("--ref_audio", request.ref_audio_path.clone());
        flag("--ref_text", request.ref_text.clone());

        args
    }

    /// Generate audio for `request`, reporting progress lines through
    /// `on_status` as they appear on the model's stderr.
    pub async fn generate<F>(
        &self,
        request: &SpeechRequest,
        mut on_status: F,
    ) -> Result<SpeechOutput, SpeechError>
    where
        F: FnMut(&str) + Send,
    {
        if request.text.trim().is_empty() {
            return Err(SpeechError::EmptyText);
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let file_prefix = format!("tts_{}", Uuid::new_v4().simple());
        let executable = self.python.executable();
        let args = self.command_args(request, &file_prefix);

        let mut status = StatusDedup::default();
        status.push("Preparing model...", &mut on_status);

        info!("Running speech generation: {:?} {:?}", executable, args);
        let mut child = Command::new(&executable)
            .args(&args)
            .current_dir(&self.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SpeechError::Spawn)?;

        status.push("Generating audio...", &mut on_status);

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[tts stdout] {}", line);
                }
            })
        });

        let mut stderr_tail = LineTail::new(STDERR_TAIL_LINES);
        if let Some(mut stderr) = child.stderr.take() {
            let mut lines = LineBuffer::new();
            let mut buffer = vec![0u8; 8 * 1024];
            loop {
                let (completed, closed) = match stderr.read(&mut buffer).await {
                    Ok(0) => (lines.finish().into_iter().collect(), true),
                    Ok(read) => (lines.push(&buffer[..read]), false),
                    Err(e) => {
                        warn!("Failed to read speech stderr: {}", e);
                        (lines.finish().into_iter().collect(), true)
                    }
                };
                for line in completed {
                    debug!("[tts stderr] {}", line);
                    if is_status_line(&line) {
                        status.push(&line, &mut on_status);
                    }
                    stderr_tail.push(&line);
                }
                if closed {
                    break;
                }
            }
        }

        if let Some(stdout) = stdout {
            let _ = stdout.await;
        }

        let exit = child.wait().await?;
        if !exit.success() {
            return Err(SpeechError::ProcessFailed {
                code: exit.code(),
                stderr: stderr_tail.join(),
            });
        }

        let audio_path = find_output(&self.output_dir, &file_prefix)
            .await?
            .ok_or(SpeechError::NoAudio)?;
        let duration_ms = wav_duration_ms(&audio_path)?;
        info!("Generated {:?} ({} ms)", audio_path, duration_ms);

        Ok(SpeechOutput {
            audio_path: audio_path.to_string_lossy().into_owned(),
            mime_type: WAV_MIME_TYPE.to_string(),
            duration_ms,
        })
    }
}

/// Whether a stderr line is worth showing as a status update.
pub fn is_status_line(line: &str) -> bool {
    STAGE_PATTERN.is_match(line) || PERCENT_PATTERN.is_match(line)
}

/// Suppresses consecutive duplicate status lines.
#[derive(Debug, Default)]
struct StatusDedup {
    last: Option<String>,
}

impl StatusDedup {
    fn push<F: FnMut(&str)>(&mut self, status: &str, on_status: &mut F) {
        let status = status.trim();
        if status.is_empty() || self.last.as_deref() == Some(status) {
            return;
        }
        self.last = Some(status.to_string());
        on_status(status);
    }
}

/// First (by name) `<prefix>*.wav` file in `dir`.
async fn find_output(dir: &Path, prefix: &str) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && name.ends_with(".wav") {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches.into_iter().next())
}

fn wav_duration_ms(path: &Path) -> Result<u64, hound::Error> {
    let reader = hound::WavReader::open(path)?;
    let sample_rate = u64::from(reader.spec().sample_rate.max(1));
    Ok(u64::from(reader.duration()) * 1000 / sample_rate)
}
