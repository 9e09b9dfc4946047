//! Event row builder.
//!
//! Turns the merged, sequence-ordered event list of one session into flat
//! display rows annotated with nesting depth, parent linkage and delegation
//! group membership, building [`DelegationGroup`]s alongside.
//!
//! Rows are appended once and never re-ordered. A later event may update an
//! existing row in place (merging a tool result) but never removes one.

use crate::delegation::{
    DelegationGroup, DelegationStatus, DelegationTracker, OpenDelegation,
};
use crate::event::EventKind;
use crate::merge::{MergedEvent, MergedMessage};
use crate::options::ReconstructOptions;
use crate::stream::OrderedEvent;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Result statuses that mean a tool call is still running.
const NON_TERMINAL_RESULT_STATUSES: &[&str] = &["running", "in_progress", "pending", "started"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    User,
    Assistant,
    ToolCall,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub value: serde_json::Value,
    pub is_error: bool,
    pub timestamp_ms: i64,
}

impl ToolResult {
    /// Terminal status implied by this result, or `None` while still running.
    pub fn terminal_status(&self) -> Option<DelegationStatus> {
        if self.is_error {
            return Some(DelegationStatus::Failed);
        }
        let status = self
            .value
            .get("status")
            .and_then(|status| status.as_str())
            .map(|status| status.trim().to_ascii_lowercase());
        match status.as_deref() {
            Some(s) if NON_TERMINAL_RESULT_STATUSES.contains(&s) => None,
            Some("failed" | "error") => Some(DelegationStatus::Failed),
            _ => Some(DelegationStatus::Completed),
        }
    }
}

/// One display-ready unit derived from one or more source events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: String,
    pub kind: RowKind,
    pub session_id: String,
    pub agent_id: String,
    pub sequence: u64,
    pub timestamp_ms: i64,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    pub is_delegate_call: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation_group_id: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_message_id: Option<String>,
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
}

impl Row {
    fn new(id: String, kind: RowKind, session_id: &str, agent_id: &str) -> Self {
        Self {
            id,
            kind,
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            sequence: 0,
            timestamp_ms: 0,
            depth: 0,
            parent_id: None,
            tool_name: None,
            tool_call_id: None,
            arguments: None,
            is_delegate_call: false,
            delegation_group_id: None,
            content: String::new(),
            thinking: String::new(),
            stream_message_id: None,
            is_live: false,
            result: None,
        }
    }

    fn at(mut self, sequence: u64, timestamp_ms: i64) -> Self {
        self.sequence = sequence;
        self.timestamp_ms = timestamp_ms;
        self
    }

    fn placed(mut self, placement: &Placement) -> Self {
        self.depth = placement.depth;
        self.parent_id = placement.parent_id.clone();
        self.delegation_group_id = placement.group_id.clone();
        self
    }

    pub fn is_message(&self) -> bool {
        matches!(self.kind, RowKind::Assistant)
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self.kind, RowKind::ToolCall)
    }

    /// Latest timestamp this row covers, including a merged result.
    pub fn last_activity_ms(&self) -> i64 {
        self.result
            .as_ref()
            .map_or(self.timestamp_ms, |result| result.timestamp_ms.max(self.timestamp_ms))
    }
}

/// Output of one row-building pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub rows: Vec<Row>,
    pub delegation_groups: BTreeMap<String, DelegationGroup>,
}

#[derive(Debug, Clone, Default)]
struct Placement {
    depth: usize,
    parent_id: Option<String>,
    group_id: Option<String>,
}

struct RowBuilder<'o> {
    session_id: String,
    options: &'o ReconstructOptions,
    rows: Vec<Row>,
    tool_rows: HashMap<String, usize>,
    latest_message: HashMap<String, usize>,
    tracker: DelegationTracker,
}

/// Build rows and delegation groups for one session.
pub fn build_rows(
    session_id: &str,
    merged: &[MergedEvent<'_>],
    options: &ReconstructOptions,
) -> RowSet {
    let mut builder = RowBuilder {
        session_id: session_id.to_string(),
        options,
        rows: Vec::new(),
        tool_rows: HashMap::new(),
        latest_message: HashMap::new(),
        tracker: DelegationTracker::default(),
    };
    for entry in merged {
        match entry {
            MergedEvent::Message(message) => builder.message(message),
            MergedEvent::Source(event) => builder.source(event),
        }
    }
    builder.finish()
}

impl RowBuilder<'_> {
    fn source(&mut self, event: &OrderedEvent<'_>) {
        let agent = event.agent_id.as_str();
        let ts = event.timestamp_ms;
        match &event.event.kind {
            EventKind::UserPrompt { text } => {
                let mut row = Row::new(
                    self.event_row_id(event),
                    RowKind::User,
                    &self.session_id,
                    agent,
                )
                .at(event.sequence(), ts);
                row.content = text.clone();
                self.rows.push(row);
            }
            EventKind::ToolCallStart {
                tool_call_id,
                tool_name,
                arguments,
            } => self.tool_call_start(event, tool_call_id, tool_name, arguments),
            EventKind::ToolCallEnd {
                tool_call_id,
                tool_name,
                result,
                is_error,
            } => self.tool_call_end(
                event,
                tool_call_id,
                tool_name.as_deref(),
                ToolResult {
                    value: result.clone(),
                    is_error: *is_error,
                    timestamp_ms: ts,
                },
            ),
            EventKind::DelegationRequested {
                delegation_id,
                target_agent_id,
                objective,
            } => self.tracker.on_requested(
                delegation_id,
                target_agent_id.as_deref(),
                objective.as_deref(),
            ),
            EventKind::DelegationCompleted {
                delegation_id,
                summary,
            } => self.tracker.on_finished(
                delegation_id,
                DelegationStatus::Completed,
                ts,
                summary.clone(),
            ),
            EventKind::DelegationFailed {
                delegation_id,
                error,
            } => self.tracker.on_finished(
                delegation_id,
                DelegationStatus::Failed,
                ts,
                error.clone(),
            ),
            EventKind::SessionForked {
                child_session_id,
                delegation_id: Some(delegation_id),
            } => self.tracker.on_forked(delegation_id, child_session_id),
            EventKind::SystemError { message } => {
                let mut row = Row::new(
                    self.event_row_id(event),
                    RowKind::Error,
                    &self.session_id,
                    agent,
                )
                .at(event.sequence(), ts);
                row.content = message.clone();
                self.rows.push(row);
            }
            EventKind::SessionForked {
                delegation_id: None,
                ..
            }
            | EventKind::LlmRequestStart
            | EventKind::LlmRequestEnd { .. }
            | EventKind::ProviderChanged { .. } => {}
            EventKind::AssistantMessage { .. }
            | EventKind::AssistantContentDelta { .. }
            | EventKind::AssistantThinkingDelta { .. } => {
                tracing::debug!(
                    sequence = event.sequence(),
                    kind = event.event.kind.name(),
                    "assistant stream event reached row builder unmerged"
                );
            }
        }
    }

    fn event_row_id(&self, event: &OrderedEvent<'_>) -> String {
        format!("{}:{}", self.session_id, event.sequence())
    }

    fn message(&mut self, message: &MergedMessage) {
        let placement = match self.tracker.route_for(&message.agent_id) {
            Some(group) => Placement {
                depth: group.depth + 1,
                parent_id: Some(group.id.clone()),
                group_id: Some(group.id.clone()),
            },
            None => Placement::default(),
        };
        let mut row = Row::new(
            format!("{}:{}", self.session_id, message.sequence),
            RowKind::Assistant,
            &self.session_id,
            &message.agent_id,
        )
        .at(message.sequence, message.timestamp_ms)
        .placed(&placement);
        row.content = message.content.clone();
        row.thinking = message.thinking.clone();
        row.stream_message_id = message.stream_message_id.clone();
        row.is_live = message.is_live;

        self.latest_message
            .insert(message.agent_id.clone(), self.rows.len());
        self.rows.push(row);
    }

    /// Where a tool-call row authored by `agent` sits.
    ///
    /// Parent is the innermost open delegation's delegating row, else the
    /// agent's own anchor (see [`Self::agent_anchor`]).
    fn tool_placement(&self, agent: &str) -> Option<Placement> {
        if let Some(open) = self.tracker.innermost_open(agent) {
            return Some(Placement {
                depth: open.depth + 1,
                parent_id: Some(open.id.clone()),
                group_id: self.tracker.route_for(agent).map(|group| group.id.clone()),
            });
        }
        self.agent_anchor(agent)
    }

    /// The agent's latest message (inside the routed group, when routed),
    /// else the routed group's delegating row.
    fn agent_anchor(&self, agent: &str) -> Option<Placement> {
        let routed = self.tracker.route_for(agent);
        let group_id = routed.map(|group| group.id.clone());

        let latest = self
            .latest_message
            .get(agent)
            .and_then(|&idx| self.rows.get(idx))
            .filter(|row| row.delegation_group_id == group_id);
        if let Some(parent) = latest {
            return Some(Placement {
                depth: parent.depth + 1,
                parent_id: Some(parent.id.clone()),
                group_id,
            });
        }

        routed.map(|group| Placement {
            depth: group.depth + 1,
            parent_id: Some(group.id.clone()),
            group_id,
        })
    }

    fn tool_call_start(
        &mut self,
        event: &OrderedEvent<'_>,
        tool_call_id: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) {
        if self.tool_rows.contains_key(tool_call_id) {
            tracing::debug!(tool_call_id, "duplicate tool_call_start ignored");
            return;
        }
        let agent = event.agent_id.as_str();
        let placement = self.tool_placement(agent).unwrap_or_default();

        let mut row = Row::new(tool_call_id.to_string(), RowKind::ToolCall, &self.session_id, agent)
            .at(event.sequence(), event.timestamp_ms)
            .placed(&placement);
        row.tool_name = Some(tool_name.to_string());
        row.tool_call_id = Some(tool_call_id.to_string());
        row.arguments = Some(arguments.clone());

        if self.options.is_delegation_tool(tool_name) {
            row.is_delegate_call = true;
            self.tracker.open_group(OpenDelegation {
                tool_call_id,
                delegating_agent_id: agent,
                target_agent_id: self.options.target_agent_from_args(arguments),
                objective: self.options.objective_from_args(arguments),
                depth: row.depth,
                timestamp_ms: event.timestamp_ms,
            });
        }

        self.tool_rows.insert(tool_call_id.to_string(), self.rows.len());
        self.rows.push(row);
    }

    fn tool_call_end(
        &mut self,
        event: &OrderedEvent<'_>,
        tool_call_id: &str,
        tool_name: Option<&str>,
        result: ToolResult,
    ) {
        if let Some(&idx) = self.tool_rows.get(tool_call_id) {
            let row = &mut self.rows[idx];
            let terminal = result.terminal_status();
            let is_delegate_call = row.is_delegate_call;
            row.result = Some(result);
            if is_delegate_call {
                if let Some(status) = terminal {
                    self.tracker
                        .finish_group(tool_call_id, status, event.timestamp_ms, None);
                }
            }
            return;
        }

        tracing::debug!(tool_call_id, "tool_call_end without matching start");
        let agent = event.agent_id.as_str();
        let placement = self.agent_anchor(agent).unwrap_or(Placement {
            depth: 1,
            parent_id: None,
            group_id: None,
        });
        let mut row = Row::new(tool_call_id.to_string(), RowKind::ToolCall, &self.session_id, agent)
            .at(event.sequence(), event.timestamp_ms)
            .placed(&placement);
        row.tool_name = tool_name.map(ToString::to_string);
        row.tool_call_id = Some(tool_call_id.to_string());
        row.result = Some(result);

        self.tool_rows.insert(tool_call_id.to_string(), self.rows.len());
        self.rows.push(row);
    }

    fn finish(self) -> RowSet {
        let mut delegation_groups = self.tracker.into_groups();
        for group in delegation_groups.values_mut() {
            group.child_rows = self
                .rows
                .iter()
                .filter(|row| row.delegation_group_id.as_deref() == Some(group.id.as_str()))
                .cloned()
                .collect();
        }
        RowSet {
            rows: self.rows,
            delegation_groups,
        }
    }
}

/// Replace each group's `child_rows` with the rows reconstructed from its
/// child session, when that session is available.
pub fn hydrate_child_rows(
    groups: &mut BTreeMap<String, DelegationGroup>,
    child_rows_by_session: &HashMap<String, Vec<Row>>,
) -> usize {
    let mut hydrated = 0;
    for group in groups.values_mut() {
        let Some(child_session_id) = group.child_session_id.as_deref() else {
            continue;
        };
        let Some(child_rows) = child_rows_by_session.get(child_session_id) else {
            continue;
        };
        if child_rows.is_empty() {
            continue;
        }
        group.child_rows = child_rows.clone();
        group.hydrated = true;
        hydrated += 1;
    }
    hydrated
}
