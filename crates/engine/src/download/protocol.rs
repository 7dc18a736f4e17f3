//! Tagged-JSON progress protocol spoken by the download helper.
//!
//! A protocol line is `MODEL_DOWNLOAD ` followed by one JSON object:
//!
//! ```text
//! MODEL_DOWNLOAD {"event":"start","totalBytes":1000}
//! MODEL_DOWNLOAD {"event":"file","path":"model.safetensors","size":900}
//! MODEL_DOWNLOAD {"percent":40,"downloadedBytes":400,"totalBytes":1000,"etaSeconds":12}
//! MODEL_DOWNLOAD {"event":"complete"}
//! ```
//!
//! Every other line is plain text. Parsing never fails: a prefixed line that
//! does not hold a JSON object, or whose `event` or `percent` has the wrong
//! type, comes back as [`ProtocolEvent::Malformed`]. Any other field with the
//! wrong type is treated as absent.

use serde::Deserialize;
use serde_json::Value;

use super::state::ProgressUpdate;
use crate::lines::LineBuffer;

pub const PROTOCOL_PREFIX: &str = "MODEL_DOWNLOAD";

/// A structured event decoded from one protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Total size is now known; progress restarts from zero
    Start { total_bytes: u64 },
    /// The helper moved on to a new file
    File { path: String, size: u64 },
    /// Progress sample
    Progress(ProgressUpdate),
    /// The helper reports the asset as complete
    Complete,
    /// Prefixed line whose payload is not a JSON object
    Malformed(String),
    /// Valid object with no recognized shape
    Unrecognized,
}

/// One complete line of child output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Protocol(ProtocolEvent),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    event: Option<String>,
    percent: Option<f64>,
    #[serde(default)]
    downloaded_bytes: Value,
    #[serde(default)]
    total_bytes: Value,
    #[serde(default)]
    eta_seconds: Value,
    #[serde(default)]
    current_file: Value,
    #[serde(default)]
    current_file_bytes: Value,
    #[serde(default)]
    current_file_total: Value,
    #[serde(default)]
    path: Value,
    #[serde(default)]
    size: Value,
}

/// Decode a single line. Returns `None` when the line is not part of the
/// protocol.
pub fn parse_line(line: &str) -> Option<ProtocolEvent> {
    let line = line.trim();
    let rest = line.strip_prefix(PROTOCOL_PREFIX)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        // e.g. MODEL_DOWNLOADER ...
        return None;
    }

    let value: serde_json::Value = match serde_json::from_str(rest.trim()) {
        Ok(value) => value,
        Err(_) => return Some(ProtocolEvent::Malformed(line.to_string())),
    };
    if !value.is_object() {
        return Some(ProtocolEvent::Malformed(line.to_string()));
    }
    let raw: RawEvent = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(_) => return Some(ProtocolEvent::Malformed(line.to_string())),
    };

    Some(match raw.event.as_deref() {
        Some("start") => ProtocolEvent::Start {
            total_bytes: to_bytes(&raw.total_bytes).unwrap_or(0),
        },
        Some("file") => match raw.path {
            Value::String(path) => ProtocolEvent::File {
                path,
                size: to_bytes(&raw.size).unwrap_or(0),
            },
            _ => ProtocolEvent::Unrecognized,
        },
        Some("complete") => ProtocolEvent::Complete,
        _ => match raw.percent {
            Some(percent) => ProtocolEvent::Progress(ProgressUpdate {
                percent: percent.clamp(0.0, 100.0),
                downloaded_bytes: to_bytes(&raw.downloaded_bytes).unwrap_or(0),
                total_bytes: to_bytes(&raw.total_bytes).unwrap_or(0),
                eta_seconds: to_bytes(&raw.eta_seconds),
                current_file: match raw.current_file {
                    Value::String(name) => Some(name),
                    _ => None,
                },
                current_file_bytes: to_bytes(&raw.current_file_bytes),
                current_file_total: to_bytes(&raw.current_file_total),
            }),
            None => ProtocolEvent::Unrecognized,
        },
    })
}

/// JSON numbers may arrive as floats; negatives clamp to zero. Anything
/// that is not a number counts as missing.
fn to_bytes(value: &Value) -> Option<u64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0).round() as u64)
}

/// Stateful parser for one output stream of one attempt.
#[derive(Debug, Default)]
pub struct OutputParser {
    lines: LineBuffer,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw chunk; returns the lines it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<OutputLine> {
        self.lines
            .push(chunk)
            .into_iter()
            .map(classify)
            .collect()
    }

    /// Flush the trailing fragment once the stream has closed.
    pub fn finish(&mut self) -> Option<OutputLine> {
        self.lines.finish().map(classify)
    }
}

fn classify(line: String) -> OutputLine {
    match parse_line(&line) {
        Some(event) => OutputLine::Protocol(event),
        None => OutputLine::Text(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_shapes() {
        let test_cases = vec![
            (
                "start event",
                r#"MODEL_DOWNLOAD {"event":"start","totalBytes":1000}"#,
                Some(ProtocolEvent::Start { total_bytes: 1000 }),
            ),
            (
                "file event",
                r#"MODEL_DOWNLOAD {"event":"file","path":"config.json","size":12}"#,
                Some(ProtocolEvent::File {
                    path: "config.json".to_string(),
                    size: 12,
                }),
            ),
            (
                "complete event",
                r#"  MODEL_DOWNLOAD {"event":"complete"}  "#,
                Some(ProtocolEvent::Complete),
            ),
            (
                "progress sample",
                r#"MODEL_DOWNLOAD {"percent":40,"downloadedBytes":400,"totalBytes":1000,"etaSeconds":12}"#,
                Some(ProtocolEvent::Progress(ProgressUpdate {
                    percent: 40.0,
                    downloaded_bytes: 400,
                    total_bytes: 1000,
                    eta_seconds: Some(12),
                    ..ProgressUpdate::default()
                })),
            ),
            (
                "progress sample with nulls and file fields",
                r#"MODEL_DOWNLOAD {"percent":7.5,"downloadedBytes":75,"totalBytes":1000,"etaSeconds":null,"currentFile":"a.bin","currentFileBytes":75,"currentFileTotal":500}"#,
                Some(ProtocolEvent::Progress(ProgressUpdate {
                    percent: 7.5,
                    downloaded_bytes: 75,
                    total_bytes: 1000,
                    eta_seconds: None,
                    current_file: Some("a.bin".to_string()),
                    current_file_bytes: Some(75),
                    current_file_total: Some(500),
                })),
            ),
            (
                "progress sample without byte counts",
                r#"MODEL_DOWNLOAD {"percent":150}"#,
                Some(ProtocolEvent::Progress(ProgressUpdate {
                    percent: 100.0,
                    ..ProgressUpdate::default()
                })),
            ),
            (
                "mistyped optional fields are treated as missing",
                r#"MODEL_DOWNLOAD {"percent":40,"downloadedBytes":400,"totalBytes":"1000","etaSeconds":"n/a","currentFile":7}"#,
                Some(ProtocolEvent::Progress(ProgressUpdate {
                    percent: 40.0,
                    downloaded_bytes: 400,
                    ..ProgressUpdate::default()
                })),
            ),
            (
                "file event with a non-string path",
                r#"MODEL_DOWNLOAD {"event":"file","path":3,"size":12}"#,
                Some(ProtocolEvent::Unrecognized),
            ),
            (
                "object with no known shape",
                r#"MODEL_DOWNLOAD {"event":"heartbeat"}"#,
                Some(ProtocolEvent::Unrecognized),
            ),
            ("plain text", "Fetching 4 files", None),
            ("longer tag", r#"MODEL_DOWNLOADER {"percent":1}"#, None),
        ];

        for (description, line, expected) in test_cases {
            assert_eq!(parse_line(line), expected, "{}", description);
        }
    }

    #[test]
    fn malformed_payloads_are_reported_not_raised() {
        let lines = [
            "MODEL_DOWNLOAD {not json",
            "MODEL_DOWNLOAD",
            "MODEL_DOWNLOAD [1, 2]",
            r#"MODEL_DOWNLOAD {"percent":"forty"}"#,
        ];

        for line in lines {
            match parse_line(line) {
                Some(ProtocolEvent::Malformed(text)) => assert_eq!(text, line.trim()),
                other => panic!("{}: expected Malformed, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn parser_classifies_lines_across_chunks() {
        let mut parser = OutputParser::new();

        let first = parser.push(b"hello\nMODEL_DOWNLOAD {\"event\":\"sta");
        assert_eq!(first, vec![OutputLine::Text("hello".to_string())]);

        let second = parser.push(b"rt\",\"totalBytes\":5}\nMODEL_DOWNLOAD {\"event\":\"complete\"}");
        assert_eq!(
            second,
            vec![OutputLine::Protocol(ProtocolEvent::Start { total_bytes: 5 })]
        );

        assert_eq!(
            parser.finish(),
            Some(OutputLine::Protocol(ProtocolEvent::Complete))
        );
    }
}
