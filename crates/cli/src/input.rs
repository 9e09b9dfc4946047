use agentlens_core::jsonl::read_events;
use agentlens_core::{EventKind, EventLog};
use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Read a JSONL event log into a deduplicated [`EventLog`].
pub fn load_log(path: &Path) -> Result<EventLog> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let report = read_events(BufReader::new(file))
        .with_context(|| format!("Failed to read events from {}", path.display()))?;
    if report.skipped > 0 {
        eprintln!(
            "Warning: skipped {} malformed line(s) in {}",
            report.skipped,
            path.display()
        );
    }

    let total = report.events.len();
    let mut log = EventLog::new();
    let applied = log.ingest_batch(report.events);
    if applied < total {
        tracing::info!(dropped = total - applied, "dropped duplicate or stale events");
    }
    Ok(log)
}

/// Pick the session to replay: `requested` when given, else the first
/// session (by id) that is never named as a forked child.
pub fn resolve_session(log: &EventLog, requested: Option<&str>, path: &Path) -> Result<String> {
    if let Some(session_id) = requested {
        if log.events(session_id).is_empty() {
            bail!("session {session_id} has no events in {}", path.display());
        }
        return Ok(session_id.to_string());
    }

    let children: HashSet<&str> = log
        .session_ids()
        .flat_map(|session_id| log.events(session_id))
        .filter_map(|event| match &event.kind {
            EventKind::SessionForked {
                child_session_id, ..
            } => Some(child_session_id.as_str()),
            _ => None,
        })
        .collect();

    log.session_ids()
        .find(|session_id| !children.contains(session_id))
        .or_else(|| log.session_ids().next())
        .map(ToString::to_string)
        .with_context(|| format!("no events in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_core::jsonl::write_events;
    use agentlens_core::testing::{assistant, event_in};

    #[test]
    fn root_session_skips_forked_children() {
        let events = vec![
            event_in("a-child", 1, "w", 10, assistant("hi")),
            event_in(
                "z-root",
                1,
                "main",
                5,
                EventKind::SessionForked {
                    child_session_id: "a-child".into(),
                    delegation_id: None,
                },
            ),
        ];
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");
        write_events(&events, File::create(&path).expect("create")).expect("write");

        let log = load_log(&path).expect("load");
        assert_eq!(resolve_session(&log, None, &path).unwrap(), "z-root");
        assert_eq!(
            resolve_session(&log, Some("a-child"), &path).unwrap(),
            "a-child"
        );
        assert!(resolve_session(&log, Some("missing"), &path).is_err());
    }

    #[test]
    fn duplicate_lines_are_dropped() {
        let line = event_in("s1", 1, "main", 5, assistant("once"));
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log.jsonl");
        write_events(&[line.clone(), line], File::create(&path).expect("create")).expect("write");

        let log = load_log(&path).expect("load");
        assert_eq!(log.events("s1").len(), 1);
        assert_eq!(log.high_water("s1"), Some(1));
    }
}
