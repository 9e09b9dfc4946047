//! Event builders for tests in this crate and its dependents.

use crate::event::{Event, EventKind};
use serde_json::Value;

/// Event in session `s1` authored by `agent`, timestamped `ts` milliseconds.
pub fn event(sequence: u64, agent: &str, ts: i64, kind: EventKind) -> Event {
    Event {
        sequence,
        session_id: "s1".to_string(),
        agent_id: Some(agent.to_string()),
        timestamp_ms: Some(ts),
        kind,
    }
}

/// Same as [`event`] in another session.
pub fn event_in(session_id: &str, sequence: u64, agent: &str, ts: i64, kind: EventKind) -> Event {
    Event {
        session_id: session_id.to_string(),
        ..event(sequence, agent, ts, kind)
    }
}

pub fn user_prompt(text: &str) -> EventKind {
    EventKind::UserPrompt {
        text: text.to_string(),
    }
}

pub fn assistant(text: &str) -> EventKind {
    EventKind::AssistantMessage {
        stream_message_id: None,
        content: text.to_string(),
        thinking: None,
    }
}

pub fn content_delta(stream_message_id: &str, delta: &str) -> EventKind {
    EventKind::AssistantContentDelta {
        stream_message_id: Some(stream_message_id.to_string()),
        delta: delta.to_string(),
    }
}

pub fn tool_start(tool_call_id: &str, tool_name: &str, arguments: Value) -> EventKind {
    EventKind::ToolCallStart {
        tool_call_id: tool_call_id.to_string(),
        tool_name: tool_name.to_string(),
        arguments,
    }
}

pub fn tool_end(tool_call_id: &str, result: Value) -> EventKind {
    EventKind::ToolCallEnd {
        tool_call_id: tool_call_id.to_string(),
        tool_name: None,
        result,
        is_error: false,
    }
}

pub fn delegation_requested(delegation_id: &str, target_agent_id: &str) -> EventKind {
    EventKind::DelegationRequested {
        delegation_id: delegation_id.to_string(),
        target_agent_id: Some(target_agent_id.to_string()),
        objective: None,
    }
}

pub fn delegation_completed(delegation_id: &str) -> EventKind {
    EventKind::DelegationCompleted {
        delegation_id: delegation_id.to_string(),
        summary: None,
    }
}

pub fn request_end(finish_reason: &str) -> EventKind {
    EventKind::LlmRequestEnd {
        finish_reason: finish_reason.to_string(),
    }
}
