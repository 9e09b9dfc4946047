//! Turn assembly: one user prompt plus the agent work that answers it.

use crate::activity::ActivitySignal;
use crate::delegation::{DelegationGroup, DelegationStatus};
use crate::event::EventKind;
use crate::rows::{Row, RowKind};
use crate::stream::OrderedEvent;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelLabel {
    pub provider: String,
    pub model: String,
}

/// A `provider_changed` event, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderChange {
    pub index: usize,
    pub timestamp_ms: i64,
    pub label: ModelLabel,
}

pub fn provider_changes(events: &[OrderedEvent<'_>]) -> Vec<ProviderChange> {
    events
        .iter()
        .filter_map(|event| match &event.event.kind {
            EventKind::ProviderChanged { provider, model } => Some((event, provider, model)),
            _ => None,
        })
        .enumerate()
        .map(|(index, (event, provider, model))| ProviderChange {
            index,
            timestamp_ms: event.timestamp_ms,
            label: ModelLabel {
                provider: provider.clone(),
                model: model.clone(),
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub id: String,
    pub user_message: Option<Row>,
    pub agent_messages: Vec<Row>,
    pub tool_calls: Vec<Row>,
    pub delegations: Vec<DelegationGroup>,
    pub errors: Vec<Row>,
    /// First agent to write a message in this turn.
    pub agent_id: Option<String>,
    pub start_time_ms: i64,
    pub end_time_ms: Option<i64>,
    pub is_active: bool,
    pub errored: bool,
    pub model: Option<ModelLabel>,
}

impl Turn {
    fn open(id: String, start_time_ms: i64) -> Self {
        Self {
            id,
            user_message: None,
            agent_messages: Vec::new(),
            tool_calls: Vec::new(),
            delegations: Vec::new(),
            errors: Vec::new(),
            agent_id: None,
            start_time_ms,
            end_time_ms: None,
            is_active: false,
            errored: false,
            model: None,
        }
    }

    /// Last timestamp any row in the turn covers.
    pub fn last_activity_ms(&self) -> i64 {
        self.user_message
            .iter()
            .chain(&self.agent_messages)
            .chain(&self.tool_calls)
            .chain(&self.errors)
            .map(Row::last_activity_ms)
            .max()
            .unwrap_or(self.start_time_ms)
    }
}

/// Fold top-level rows into turns.
///
/// Rows tagged with a delegation group belong to that group's sub-timeline
/// and are skipped here.
pub fn assemble_turns(
    rows: &[Row],
    groups: &BTreeMap<String, DelegationGroup>,
    changes: &[ProviderChange],
    activity: &ActivitySignal,
) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();
    let mut current: Option<Turn> = None;
    // Start of the following turn, used as the provider-change window bound.
    let mut bounds: Vec<Option<i64>> = Vec::new();

    for row in rows.iter().filter(|row| row.delegation_group_id.is_none()) {
        if row.kind == RowKind::User {
            if let Some(mut previous) = current.take() {
                previous.end_time_ms.get_or_insert(row.timestamp_ms);
                turns.push(previous);
                bounds.push(Some(row.timestamp_ms));
            }
            let mut turn = Turn::open(row.id.clone(), row.timestamp_ms);
            turn.user_message = Some(row.clone());
            current = Some(turn);
            continue;
        }

        let turn = current.get_or_insert_with(|| Turn::open(row.id.clone(), row.timestamp_ms));
        match row.kind {
            RowKind::Assistant => {
                turn.agent_id.get_or_insert_with(|| row.agent_id.clone());
                turn.agent_messages.push(row.clone());
            }
            RowKind::ToolCall => {
                if row.is_delegate_call {
                    if let Some(group) = groups.get(&row.id) {
                        turn.delegations.push(group.clone());
                    }
                }
                turn.tool_calls.push(row.clone());
            }
            RowKind::Error => {
                turn.errored = true;
                turn.errors.push(row.clone());
            }
            RowKind::User => {}
        }
    }

    if let Some(mut last) = current {
        last.is_active = match last.agent_id.as_deref() {
            Some(agent) => activity.is_thinking(agent),
            None => !activity.thinking_agents.is_empty(),
        };
        if !last.is_active {
            last.end_time_ms = Some(last.last_activity_ms());
        }
        turns.push(last);
        bounds.push(None);
    }

    for (turn, bound) in turns.iter_mut().zip(bounds) {
        turn.model = effective_model(changes, turn.start_time_ms, bound);
    }
    turns
}

/// Latest change at or before `start` (ties keep the earlier index), replaced
/// by the latest change that lands strictly inside the turn window.
pub fn effective_model(
    changes: &[ProviderChange],
    start: i64,
    next_turn_start: Option<i64>,
) -> Option<ModelLabel> {
    let mut at_start: Option<&ProviderChange> = None;
    let mut mid_turn: Option<&ProviderChange> = None;
    for change in changes {
        let slot = if change.timestamp_ms <= start {
            &mut at_start
        } else if next_turn_start.is_none_or(|bound| change.timestamp_ms < bound) {
            &mut mid_turn
        } else {
            continue;
        };
        if slot.is_none_or(|best| change.timestamp_ms > best.timestamp_ms) {
            *slot = Some(change);
        }
    }
    mid_turn.or(at_start).map(|change| change.label.clone())
}

/// Render a delegation group as its own pseudo-turn.
pub fn delegation_turn(
    group: &DelegationGroup,
    groups: &BTreeMap<String, DelegationGroup>,
) -> Turn {
    let mut turn = Turn::open(group.id.clone(), group.start_time_ms);
    turn.agent_id = group.target_agent_id.clone();
    for row in &group.child_rows {
        match row.kind {
            RowKind::Assistant => turn.agent_messages.push(row.clone()),
            RowKind::ToolCall => {
                if row.is_delegate_call {
                    if let Some(nested) = groups.get(&row.id) {
                        turn.delegations.push(nested.clone());
                    }
                }
                turn.tool_calls.push(row.clone());
            }
            RowKind::Error => turn.errors.push(row.clone()),
            RowKind::User => {}
        }
    }

    turn.end_time_ms = group.end_time_ms;
    if group.hydrated {
        if let Some(first) = group.child_rows.first() {
            turn.start_time_ms = first.timestamp_ms;
        }
        if let Some(last) = group.child_rows.iter().map(Row::last_activity_ms).max() {
            turn.end_time_ms = Some(last);
        }
    }
    turn.is_active = group.status == DelegationStatus::InProgress;
    turn.errored = group.status == DelegationStatus::Failed || !turn.errors.is_empty();
    turn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::merge::merge_stream;
    use crate::options::ReconstructOptions;
    use crate::rows::build_rows;
    use crate::stream::order_events;
    use serde_json::json;

    fn ev(sequence: u64, agent: &str, ts: i64, kind: EventKind) -> Event {
        Event {
            sequence,
            session_id: "s1".to_string(),
            agent_id: Some(agent.to_string()),
            timestamp_ms: Some(ts),
            kind,
        }
    }

    fn prompt(sequence: u64, ts: i64) -> Event {
        ev(sequence, "main", ts, EventKind::UserPrompt { text: format!("q{sequence}") })
    }

    fn said(sequence: u64, agent: &str, ts: i64) -> Event {
        ev(
            sequence,
            agent,
            ts,
            EventKind::AssistantMessage {
                stream_message_id: None,
                content: format!("a{sequence}"),
                thinking: None,
            },
        )
    }

    fn switch(sequence: u64, ts: i64, model: &str) -> Event {
        ev(
            sequence,
            "main",
            ts,
            EventKind::ProviderChanged {
                provider: "anthropic".into(),
                model: model.into(),
            },
        )
    }

    fn turns_for(events: &[Event], activity: &ActivitySignal) -> Vec<Turn> {
        let options = ReconstructOptions::default();
        let ordered = order_events("s1", events, &options);
        let set = build_rows("s1", &merge_stream(&ordered), &options);
        assemble_turns(
            &set.rows,
            &set.delegation_groups,
            &provider_changes(&ordered),
            activity,
        )
    }

    #[test]
    fn user_rows_split_turns() {
        let turns = turns_for(
            &[prompt(1, 100), said(2, "main", 200), prompt(3, 300), said(4, "main", 400)],
            &ActivitySignal::default(),
        );
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].end_time_ms, Some(300));
        assert_eq!(turns[0].agent_id.as_deref(), Some("main"));
        assert_eq!(turns[1].end_time_ms, Some(400));
        assert!(!turns[1].is_active);
    }

    #[test]
    fn agent_initiated_turn_has_no_user_message() {
        let turns = turns_for(&[said(1, "main", 50)], &ActivitySignal::default());
        assert_eq!(turns.len(), 1);
        assert!(turns[0].user_message.is_none());
        assert_eq!(turns[0].id, "s1:1");
    }

    #[test]
    fn final_turn_active_while_agent_thinking() {
        let mut activity = ActivitySignal::default();
        activity.thinking_agents.insert("main".into());
        let turns = turns_for(&[prompt(1, 100), said(2, "main", 200)], &activity);
        assert!(turns[0].is_active);
        assert_eq!(turns[0].end_time_ms, None);
    }

    #[test]
    fn delegated_rows_stay_out_of_parent_turn() {
        let events = vec![
            prompt(1, 100),
            said(2, "main", 200),
            ev(
                3,
                "main",
                300,
                EventKind::ToolCallStart {
                    tool_call_id: "tc-d".into(),
                    tool_name: "delegate".into(),
                    arguments: json!({"agent_id": "w"}),
                },
            ),
            ev(
                4,
                "main",
                310,
                EventKind::DelegationRequested {
                    delegation_id: "d1".into(),
                    target_agent_id: Some("w".into()),
                    objective: Some("dig".into()),
                },
            ),
            said(5, "w", 400),
        ];
        let turns = turns_for(&events, &ActivitySignal::default());
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].agent_messages.len(), 1);
        assert_eq!(turns[0].tool_calls.len(), 1);
        assert_eq!(turns[0].delegations.len(), 1);
        assert_eq!(turns[0].delegations[0].id, "tc-d");
    }

    #[test]
    fn model_label_tracks_switches() {
        let turns = turns_for(
            &[
                switch(1, 50, "opus"),
                switch(2, 50, "haiku"),
                prompt(3, 100),
                said(4, "main", 150),
                prompt(5, 200),
                switch(6, 250, "sonnet"),
                said(7, "main", 300),
            ],
            &ActivitySignal::default(),
        );
        assert_eq!(turns[0].model.as_ref().unwrap().model, "opus");
        assert_eq!(turns[1].model.as_ref().unwrap().model, "sonnet");
    }

    #[test]
    fn errors_mark_turn() {
        let turns = turns_for(
            &[
                prompt(1, 100),
                ev(2, "main", 150, EventKind::SystemError { message: "boom".into() }),
            ],
            &ActivitySignal::default(),
        );
        assert!(turns[0].errored);
        assert_eq!(turns[0].errors.len(), 1);
    }

    #[test]
    fn delegation_pseudo_turn_prefers_hydrated_times() {
        let mut group = DelegationGroup {
            id: "tc-d".into(),
            delegating_tool_call_id: "tc-d".into(),
            delegating_agent_id: "main".into(),
            delegation_id: Some("d1".into()),
            target_agent_id: Some("w".into()),
            objective: None,
            child_session_id: Some("child".into()),
            status: DelegationStatus::InProgress,
            start_time_ms: 10,
            end_time_ms: None,
            outcome: None,
            depth: 1,
            child_rows: Vec::new(),
            hydrated: false,
        };
        let groups = BTreeMap::new();
        let turn = delegation_turn(&group, &groups);
        assert_eq!(turn.start_time_ms, 10);
        assert!(turn.is_active);

        let options = ReconstructOptions::default();
        let child_events = vec![
            Event {
                session_id: "child".into(),
                ..said(1, "w", 40)
            },
            Event {
                session_id: "child".into(),
                ..said(2, "w", 90)
            },
        ];
        let ordered = order_events("child", &child_events, &options);
        group.child_rows = build_rows("child", &merge_stream(&ordered), &options).rows;
        group.hydrated = true;
        group.finish(DelegationStatus::Completed, 95, None);

        let turn = delegation_turn(&group, &groups);
        assert_eq!(turn.start_time_ms, 40);
        assert_eq!(turn.end_time_ms, Some(90));
        assert_eq!(turn.agent_messages.len(), 2);
        assert!(!turn.is_active);
    }
}
