//! JSONL event log: one [`Event`] per line.
//!
//! ```jsonl
//! {"sequence":1,"session_id":"s1","agent_id":"main","timestamp":1000,"kind":{"type":"user_prompt","data":{"text":"hi"}}}
//! {"sequence":2,"session_id":"s1","agent_id":"main","timestamp":4000,"kind":{"type":"llm_request_end","data":{"finish_reason":"stop"}}}
//! ```
//!
//! Reading is lenient per line: a line that does not parse is skipped and
//! counted, so one corrupt record never hides the rest of the log.

use crate::event::Event;
use std::io::{self, BufRead, Write};

/// Error types for JSONL operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum JsonlError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// Events read from a log plus the number of lines that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadReport {
    pub events: Vec<Event>,
    pub skipped: usize,
}

pub fn read_events<R: BufRead>(reader: R) -> Result<ReadReport, JsonlError> {
    let mut report = ReadReport::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(trimmed) {
            Ok(event) => report.events.push(event),
            Err(error) => {
                tracing::warn!(line = idx + 1, %error, "skipping malformed event line");
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}

pub fn from_jsonl_str(s: &str) -> Result<ReadReport, JsonlError> {
    read_events(io::BufReader::new(s.as_bytes()))
}

pub fn write_events<W: Write>(events: &[Event], mut writer: W) -> Result<(), JsonlError> {
    for (i, event) in events.iter().enumerate() {
        serde_json::to_writer(&mut writer, event).map_err(|e| JsonlError::Json {
            line: i + 1,
            source: e,
        })?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn to_jsonl_string(events: &[Event]) -> Result<String, JsonlError> {
    let mut buf = Vec::new();
    write_events(events, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
