#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use menubar_tts_engine::{PythonRuntime, SpeechError, SpeechGenerator, SpeechRequest};

/// Install an executable fake interpreter at `<root>/.venv/bin/python`.
fn fake_python(root: &Path, body: &str) {
    let bin = root.join(".venv").join("bin");
    fs::create_dir_all(&bin).unwrap();
    let python = bin.join("python");
    fs::write(&python, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(&python, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Half a second of silence at 24 kHz.
fn reference_wav(dir: &Path) -> PathBuf {
    let path = dir.join("reference.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..12_000 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}

const FIND_PREFIX: &str = r#"prefix=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--file_prefix" ]; then prefix="$2"; fi
  shift
done
"#;

#[tokio::test]
async fn generates_audio_and_reports_model_status() {
    let root = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let wav = reference_wav(root.path());
    fake_python(
        root.path(),
        &format!(
            r#"{}
echo "Fetching 4 files" >&2
echo "Fetching 4 files" >&2
echo "warming up" >&2
printf ' 50%%|#####     | 5/10\r100%%|##########| 10/10\n' >&2
echo "Loading model" >&2
cp "{}" "${{prefix}}_000.wav"
"#,
            FIND_PREFIX,
            wav.display()
        ),
    );

    let generator = SpeechGenerator::new(
        PythonRuntime::new(root.path()),
        "org/tts-model",
        output.path().join("tts-output"),
    );
    let mut statuses = Vec::new();

    let result = generator
        .generate(&SpeechRequest::new("Hello there"), |s| statuses.push(s.to_string()))
        .await
        .unwrap();

    assert_eq!(
        statuses,
        vec![
            "Preparing model...",
            "Generating audio...",
            "Fetching 4 files",
            "50%|#####     | 5/10",
            "100%|##########| 10/10",
            "Loading model",
        ]
    );
    assert_eq!(result.mime_type, "audio/wav");
    assert_eq!(result.duration_ms, 500);
    let path = Path::new(&result.audio_path);
    assert!(path.starts_with(output.path().join("tts-output")));
    let name = path.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("tts_") && name.ends_with("_000.wav"), "{}", name);
}

#[tokio::test]
async fn failing_process_returns_its_stderr() {
    let root = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fake_python(root.path(), "echo 'ValueError: unknown voice' >&2\nexit 4\n");

    let generator = SpeechGenerator::new(PythonRuntime::new(root.path()), "m", output.path());
    let error = generator
        .generate(&SpeechRequest::new("Hi"), |_| {})
        .await
        .unwrap_err();

    match &error {
        SpeechError::ProcessFailed { code, stderr } => {
            assert_eq!(*code, Some(4));
            assert_eq!(stderr, "ValueError: unknown voice");
        }
        other => panic!("expected ProcessFailed, got {:?}", other),
    }
    assert_eq!(
        error.user_message(),
        "Speech generation failed: ValueError: unknown voice"
    );
}

#[tokio::test]
async fn failure_report_keeps_only_the_end_of_stderr() {
    let root = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fake_python(
        root.path(),
        "i=0\nwhile [ $i -lt 500 ]; do printf '%3d%%|#\\r' $((i % 100)) >&2; i=$((i + 1)); done\necho 'RuntimeError: out of memory' >&2\nexit 1\n",
    );

    let generator = SpeechGenerator::new(PythonRuntime::new(root.path()), "m", output.path());
    let error = generator
        .generate(&SpeechRequest::new("Hi"), |_| {})
        .await
        .unwrap_err();

    match &error {
        SpeechError::ProcessFailed { stderr, .. } => {
            let kept = stderr.lines().count();
            assert!(kept > 1 && kept < 100, "kept {} stderr lines", kept);
            assert!(stderr.ends_with("RuntimeError: out of memory"), "{}", stderr);
        }
        other => panic!("expected ProcessFailed, got {:?}", other),
    }
    assert_eq!(
        error.user_message(),
        "Speech generation failed: RuntimeError: out of memory"
    );
}

#[tokio::test]
async fn clean_exit_without_audio_is_an_error() {
    let root = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fake_python(root.path(), "exit 0\n");

    let generator = SpeechGenerator::new(PythonRuntime::new(root.path()), "m", output.path());
    let result = generator.generate(&SpeechRequest::new("Hi"), |_| {}).await;

    assert!(matches!(result, Err(SpeechError::NoAudio)));
}
