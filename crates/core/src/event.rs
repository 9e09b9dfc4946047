use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// A single committed event in a session's append-only stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonically increasing within `session_id`.
    pub sequence: u64,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Epoch milliseconds. Unparseable wire values become `None`.
    #[serde(
        default,
        rename = "timestamp",
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp_ms: Option<i64>,
    pub kind: EventKind,
}

/// Event payload, discriminated by the wire tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    UserPrompt {
        #[serde(default)]
        text: String,
    },
    /// Terminal stored form of an assistant message.
    AssistantMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_message_id: Option<String>,
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thinking: Option<String>,
    },
    AssistantContentDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_message_id: Option<String>,
        #[serde(default)]
        delta: String,
    },
    AssistantThinkingDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_message_id: Option<String>,
        #[serde(default)]
        delta: String,
    },
    LlmRequestStart,
    LlmRequestEnd {
        #[serde(default)]
        finish_reason: String,
    },
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    ToolCallEnd {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    DelegationRequested {
        delegation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        objective: Option<String>,
    },
    DelegationCompleted {
        delegation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    DelegationFailed {
        delegation_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SessionForked {
        child_session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delegation_id: Option<String>,
    },
    ProviderChanged {
        #[serde(default)]
        provider: String,
        #[serde(default)]
        model: String,
    },
    /// Session-wide when the envelope has no `agent_id`.
    SystemError {
        #[serde(default)]
        message: String,
    },
}

impl EventKind {
    /// Wire tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserPrompt { .. } => "user_prompt",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::AssistantContentDelta { .. } => "assistant_content_delta",
            Self::AssistantThinkingDelta { .. } => "assistant_thinking_delta",
            Self::LlmRequestStart => "llm_request_start",
            Self::LlmRequestEnd { .. } => "llm_request_end",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallEnd { .. } => "tool_call_end",
            Self::DelegationRequested { .. } => "delegation_requested",
            Self::DelegationCompleted { .. } => "delegation_completed",
            Self::DelegationFailed { .. } => "delegation_failed",
            Self::SessionForked { .. } => "session_forked",
            Self::ProviderChanged { .. } => "provider_changed",
            Self::SystemError { .. } => "system_error",
        }
    }
}

/// Why a model request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
    Cancelled,
    Other,
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stop" | "end_turn" => Self::Stop,
            "tool_calls" | "tool_use" => Self::ToolCalls,
            "length" | "max_tokens" => Self::Length,
            "error" => Self::Error,
            "cancelled" | "canceled" | "aborted" => Self::Cancelled,
            _ => Self::Other,
        }
    }

    /// Whether the agent hands control back to the user.
    pub fn hands_back(self) -> bool {
        matches!(self, Self::Stop | Self::Error | Self::Cancelled)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(parse_timestamp(&raw))
}

/// Epoch milliseconds from an integer, float, numeric string, or RFC 3339 string.
pub fn parse_timestamp(raw: &serde_json::Value) -> Option<i64> {
    match raw {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(ms) = trimmed.parse::<i64>() {
                return Some(ms);
            }
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }
        _ => None,
    }
}
