use std::io::Write;

use agentlens_core::{DelegationGroup, Row, RowKind, SessionView, Turn};
use anyhow::Result;
use serde_json::json;

/// Output format for replay commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_config(format: agentlens_runtime_config::OutputFormat) -> Self {
        match format {
            agentlens_runtime_config::OutputFormat::Json => Self::Json,
            agentlens_runtime_config::OutputFormat::Text
            | agentlens_runtime_config::OutputFormat::Unknown => Self::Text,
        }
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `1h 02m 03s`, `2m 05s`, `7s`.
pub fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() > max_chars {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

fn row_label(row: &Row) -> String {
    match row.kind {
        RowKind::User => format!("user: {}", preview(&row.content, 80)),
        RowKind::Assistant => {
            let live = if row.is_live { " (streaming)" } else { "" };
            format!("{}{live}: {}", row.agent_id, preview(&row.content, 80))
        }
        RowKind::ToolCall => {
            let name = row.tool_name.as_deref().unwrap_or("?");
            let state = match &row.result {
                None => "running",
                Some(result) if result.is_error => "error",
                Some(_) => "done",
            };
            let delegate = if row.is_delegate_call { " [delegate]" } else { "" };
            format!("{}: {name}{delegate} ({state})", row.agent_id)
        }
        RowKind::Error => format!("error: {}", preview(&row.content, 80)),
    }
}

pub fn render_rows(
    view: &SessionView,
    format: OutputFormat,
    _now: i64,
    writer: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(writer, "{}", serde_json::to_string_pretty(&view.rows)?)?;
        }
        OutputFormat::Text => {
            for row in &view.rows {
                writeln!(writer, "{}{}", "  ".repeat(row.depth), row_label(row))?;
            }
        }
    }
    Ok(())
}

fn turn_summary(turn: &Turn) -> String {
    let model = turn
        .model
        .as_ref()
        .map(|label| format!(" [{}/{}]", label.provider, label.model))
        .unwrap_or_default();
    let span = match turn.end_time_ms {
        Some(end) => format_duration(end.saturating_sub(turn.start_time_ms)),
        None => "open".to_string(),
    };
    let mut flags = Vec::new();
    if turn.is_active {
        flags.push("active");
    }
    if turn.errored {
        flags.push("errored");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" ({})", flags.join(", "))
    };
    format!(
        "{}{model} {span}: {} message(s), {} tool call(s), {} delegation(s){flags}",
        turn.id,
        turn.agent_messages.len(),
        turn.tool_calls.len(),
        turn.delegations.len()
    )
}

pub fn render_turns(
    view: &SessionView,
    format: OutputFormat,
    _now: i64,
    writer: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(writer, "{}", serde_json::to_string_pretty(&view.turns)?)?;
        }
        OutputFormat::Text => {
            for turn in &view.turns {
                writeln!(writer, "{}", turn_summary(turn))?;
                if let Some(user) = &turn.user_message {
                    writeln!(writer, "  > {}", preview(&user.content, 100))?;
                }
                for message in &turn.agent_messages {
                    writeln!(writer, "  {}: {}", message.agent_id, preview(&message.content, 100))?;
                }
                for error in &turn.errors {
                    writeln!(writer, "  ! {}", preview(&error.content, 100))?;
                }
            }
        }
    }
    Ok(())
}

fn group_summary(group: &DelegationGroup) -> String {
    let target = group.target_agent_id.as_deref().unwrap_or("?");
    let span = match group.end_time_ms {
        Some(end) => format_duration(end.saturating_sub(group.start_time_ms)),
        None => "open".to_string(),
    };
    let status = serde_json::to_value(group.status)
        .ok()
        .and_then(|value| value.as_str().map(ToString::to_string))
        .unwrap_or_default();
    let mut line = format!(
        "{} {} -> {target} [{status}] {span}, {} child row(s)",
        group.id,
        group.delegating_agent_id,
        group.child_rows.len()
    );
    if let Some(child) = &group.child_session_id {
        line.push_str(&format!(", session {child}"));
        if group.hydrated {
            line.push_str(" (hydrated)");
        }
    }
    if let Some(objective) = &group.objective {
        line.push_str(&format!("\n  objective: {}", preview(objective, 100)));
    }
    if let Some(outcome) = &group.outcome {
        line.push_str(&format!("\n  outcome: {}", preview(outcome, 100)));
    }
    line
}

pub fn render_groups(
    view: &SessionView,
    format: OutputFormat,
    _now: i64,
    writer: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let groups: Vec<_> = view
                .delegation_groups
                .values()
                .map(|group| {
                    json!({
                        "group": group,
                        "turn": view.delegation_turn(&group.id),
                    })
                })
                .collect();
            writeln!(writer, "{}", serde_json::to_string_pretty(&groups)?)?;
        }
        OutputFormat::Text => {
            if view.delegation_groups.is_empty() {
                writeln!(writer, "No delegations.")?;
            }
            for group in view.delegation_groups.values() {
                writeln!(writer, "{}", group_summary(group))?;
            }
        }
    }
    Ok(())
}

pub fn timers_json(view: &SessionView, now: i64) -> serde_json::Value {
    json!({
        "session_id": view.session_id,
        "now_ms": now,
        "global_elapsed_ms": view.global_elapsed_ms(now),
        "agent_elapsed_ms": view.agent_elapsed_ms(now),
        "is_session_active": view.is_session_active(),
        "running": view.needs_tick(),
    })
}

pub fn timers_line(view: &SessionView, now: i64) -> String {
    let agents: Vec<String> = view
        .agent_elapsed_ms(now)
        .into_iter()
        .map(|(agent, ms)| format!("{agent} {}", format_duration(ms)))
        .collect();
    let state = if view.needs_tick() { "running" } else { "paused" };
    format!(
        "session {} [{state}]: total {}{}{}",
        view.session_id,
        format_duration(view.global_elapsed_ms(now)),
        if agents.is_empty() { "" } else { " | " },
        agents.join(", ")
    )
}

pub fn render_timers(
    view: &SessionView,
    format: OutputFormat,
    now: i64,
    writer: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(writer, "{}", serde_json::to_string_pretty(&timers_json(view, now))?)?;
        }
        OutputFormat::Text => writeln!(writer, "{}", timers_line(view, now))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_core::ReconstructOptions;
    use agentlens_core::testing::{event, request_end, user_prompt};

    fn finished_view() -> SessionView {
        let events = vec![
            event(1, "main", 1000, user_prompt("hello there")),
            event(2, "main", 4000, request_end("stop")),
        ];
        SessionView::build("s1", &events, None, &ReconstructOptions::default())
    }

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(7_400), "7s");
        assert_eq!(format_duration(125_000), "2m 05s");
        assert_eq!(format_duration(3_723_000), "1h 02m 03s");
        assert_eq!(format_duration(-5), "0s");
    }

    #[test]
    fn timers_text_shows_totals() {
        let line = timers_line(&finished_view(), 99_000);
        assert_eq!(line, "session s1 [paused]: total 3s | main 3s");
    }

    #[test]
    fn rows_text_indents_by_depth() {
        let mut out = Vec::new();
        render_rows(&finished_view(), OutputFormat::Text, 0, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "user: hello there\n");
    }

    #[test]
    fn config_format_maps_unknown_to_text() {
        assert_eq!(
            OutputFormat::from_config(agentlens_runtime_config::OutputFormat::Unknown),
            OutputFormat::Text
        );
    }
}
