use std::io;

/// The supervisor task has stopped and can no longer be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    #[error("Model download supervisor has shut down")]
    Closed,
    #[error("Model download supervisor did not stop within {0:?}")]
    ShutdownTimedOut(std::time::Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("No text to speak")]
    EmptyText,

    #[error("Failed to start speech process: {0}")]
    Spawn(#[source] io::Error),

    #[error("Speech process exited with {}: {stderr}", describe_exit(.code))]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("Speech process finished without writing audio")]
    NoAudio,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read generated audio: {0}")]
    Audio(#[from] hound::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

impl SpeechError {
    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            SpeechError::EmptyText => "Enter some text to speak.".to_string(),
            SpeechError::Spawn(_) => {
                "Could not start the speech engine. Check the Python environment.".to_string()
            }
            SpeechError::ProcessFailed { stderr, .. } => {
                let last = stderr.lines().rev().find(|l| !l.trim().is_empty());
                match last {
                    Some(line) => format!("Speech generation failed: {}", line.trim()),
                    None => "Speech generation failed.".to_string(),
                }
            }
            SpeechError::NoAudio => "The speech engine produced no audio.".to_string(),
            SpeechError::Io(_) | SpeechError::Audio(_) => {
                "Failed to read generated audio. Check disk space.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_quotes_last_stderr_line() {
        let error = SpeechError::ProcessFailed {
            code: Some(1),
            stderr: "Traceback\n  File \"gen.py\"\nValueError: bad voice\n\n".to_string(),
        };

        assert_eq!(
            error.user_message(),
            "Speech generation failed: ValueError: bad voice"
        );
        assert_eq!(
            error.to_string(),
            "Speech process exited with code 1: Traceback\n  File \"gen.py\"\nValueError: bad voice\n\n"
        );
    }

    #[test]
    fn signal_exit_is_described() {
        let error = SpeechError::ProcessFailed {
            code: None,
            stderr: String::new(),
        };

        assert_eq!(error.to_string(), "Speech process exited with a signal: ");
        assert_eq!(error.user_message(), "Speech generation failed.");
    }
}
