//! Session view: the single entry point that runs ordering, merging, row
//! building, turn assembly and timer replay over one snapshot of events.

use crate::activity::ActivitySignal;
use crate::delegation::DelegationGroup;
use crate::event::Event;
use crate::merge::merge_stream;
use crate::options::ReconstructOptions;
use crate::rows::{Row, RowSet, build_rows, hydrate_child_rows};
use crate::stream::{OrderedEvent, order_events};
use crate::timer::SessionTimers;
use crate::turns::{Turn, assemble_turns, delegation_turn, provider_changes};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub rows: Vec<Row>,
    pub delegation_groups: BTreeMap<String, DelegationGroup>,
    pub turns: Vec<Turn>,
    pub timers: SessionTimers,
    pub activity: ActivitySignal,
    /// Highest sequence applied for this session.
    pub high_water: Option<u64>,
}

impl SessionView {
    /// Reconstruct one session. When `activity` is `None` it is derived from
    /// the same events.
    pub fn build(
        session_id: &str,
        events: &[Event],
        activity: Option<ActivitySignal>,
        options: &ReconstructOptions,
    ) -> Self {
        let ordered = order_events(session_id, events, options);
        let set = build_rows(session_id, &merge_stream(&ordered), options);
        Self::from_parts(session_id, &ordered, set, activity)
    }

    fn from_parts(
        session_id: &str,
        ordered: &[OrderedEvent<'_>],
        set: RowSet,
        activity: Option<ActivitySignal>,
    ) -> Self {
        let activity = activity.unwrap_or_else(|| ActivitySignal::derive(ordered));
        let turns = assemble_turns(
            &set.rows,
            &set.delegation_groups,
            &provider_changes(ordered),
            &activity,
        );
        Self {
            session_id: session_id.to_string(),
            timers: SessionTimers::replay(ordered),
            high_water: ordered.last().map(OrderedEvent::sequence),
            rows: set.rows,
            delegation_groups: set.delegation_groups,
            turns,
            activity,
        }
    }

    pub fn global_elapsed_ms(&self, now_ms: i64) -> i64 {
        self.timers.global_elapsed_ms(now_ms)
    }

    pub fn agent_elapsed_ms(&self, now_ms: i64) -> BTreeMap<String, i64> {
        self.timers.agent_elapsed_ms(now_ms)
    }

    pub fn is_session_active(&self) -> bool {
        self.activity.is_session_active()
    }

    pub fn needs_tick(&self) -> bool {
        self.timers.needs_tick()
    }

    pub fn delegation_turn(&self, group_id: &str) -> Option<Turn> {
        self.delegation_groups
            .get(group_id)
            .map(|group| delegation_turn(group, &self.delegation_groups))
    }

    pub fn delegation_turns(&self) -> Vec<Turn> {
        self.delegation_groups
            .values()
            .map(|group| delegation_turn(group, &self.delegation_groups))
            .collect()
    }
}

/// Reconstruct `root_session_id` and, recursively, every forked child
/// session present in `events`, attaching child rows to their delegation
/// groups. Groups found inside child sessions are added to the root's map
/// without replacing root entries.
pub fn reconstruct_tree(
    root_session_id: &str,
    events: &[Event],
    options: &ReconstructOptions,
) -> SessionView {
    let mut path = HashSet::new();
    tree_view(root_session_id, events, options, &mut path)
}

fn tree_view(
    session_id: &str,
    events: &[Event],
    options: &ReconstructOptions,
    path: &mut HashSet<String>,
) -> SessionView {
    path.insert(session_id.to_string());
    let ordered = order_events(session_id, events, options);
    let mut set = build_rows(session_id, &merge_stream(&ordered), options);

    let children: Vec<String> = set
        .delegation_groups
        .values()
        .filter_map(|group| group.child_session_id.clone())
        .collect();

    let mut child_rows: HashMap<String, Vec<Row>> = HashMap::new();
    let mut nested: BTreeMap<String, DelegationGroup> = BTreeMap::new();
    for child in children {
        if path.contains(&child) {
            tracing::debug!(session_id, child = %child, "skipping cyclic child session");
            continue;
        }
        if child_rows.contains_key(&child) {
            continue;
        }
        let view = tree_view(&child, events, options, path);
        for (id, group) in view.delegation_groups {
            nested.entry(id).or_insert(group);
        }
        child_rows.insert(child, view.rows);
    }

    hydrate_child_rows(&mut set.delegation_groups, &child_rows);
    for (id, group) in nested {
        set.delegation_groups.entry(id).or_insert(group);
    }
    path.remove(session_id);
    SessionView::from_parts(session_id, &ordered, set, None)
}
