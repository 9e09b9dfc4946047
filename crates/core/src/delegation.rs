//! Delegation lifecycle tracking.
//!
//! A delegation is reported on two different events: the delegating tool call
//! (keyed by tool-call id) and `delegation_requested` (keyed by delegation id).
//! They may arrive in either order, so correlation uses two independent
//! tables instead of a pointer graph:
//!
//! - *pending*: delegating tool calls per target agent, awaiting their request
//!   (FIFO, so repeated delegations to the same agent pair up in order);
//! - *active*: delegation id → target agent, used to route the target agent's
//!   rows into the group while the delegation is open.
//!
//! Each originating agent also owns a stack of open delegations. Closing an
//! inner delegation never closes an outer one.

use crate::rows::Row;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Key used for pending/parked entries whose target agent is unknown.
const UNKNOWN_TARGET: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    InProgress,
    Completed,
    Failed,
}

impl DelegationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegationGroup {
    /// Same as `delegating_tool_call_id`.
    pub id: String,
    pub delegating_tool_call_id: String,
    pub delegating_agent_id: String,
    pub delegation_id: Option<String>,
    pub target_agent_id: Option<String>,
    pub objective: Option<String>,
    pub child_session_id: Option<String>,
    pub status: DelegationStatus,
    pub start_time_ms: i64,
    pub end_time_ms: Option<i64>,
    /// Summary on completion, error text on failure.
    pub outcome: Option<String>,
    /// Depth of the delegating tool-call row.
    pub depth: usize,
    pub child_rows: Vec<Row>,
    /// True once `child_rows` come from the child session's own reconstruction.
    pub hydrated: bool,
}

impl DelegationGroup {
    /// Move to a terminal status. No-op once terminal.
    pub fn finish(&mut self, status: DelegationStatus, at_ms: i64, outcome: Option<String>) {
        if self.status.is_terminal() || !status.is_terminal() {
            return;
        }
        self.status = status;
        self.end_time_ms = Some(at_ms);
        if outcome.is_some() {
            self.outcome = outcome;
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == DelegationStatus::InProgress
    }
}

#[derive(Debug, Clone)]
struct ParkedRequest {
    delegation_id: String,
    target_agent_id: Option<String>,
    objective: Option<String>,
}

#[derive(Debug, Clone)]
struct ParkedOutcome {
    status: DelegationStatus,
    at_ms: i64,
    outcome: Option<String>,
}

#[derive(Debug, Clone)]
struct ActiveDelegation {
    target_agent_id: String,
    group_id: String,
    order: u64,
}

/// Fold accumulator for delegation state within one reconstruction pass.
#[derive(Debug, Default)]
pub struct DelegationTracker {
    groups: BTreeMap<String, DelegationGroup>,
    open_stacks: HashMap<String, Vec<String>>,
    pending: HashMap<String, VecDeque<String>>,
    parked_requests: HashMap<String, VecDeque<ParkedRequest>>,
    by_delegation_id: HashMap<String, String>,
    active: HashMap<String, ActiveDelegation>,
    parked_forks: HashMap<String, String>,
    parked_outcomes: HashMap<String, ParkedOutcome>,
    activations: u64,
}

/// Everything needed to open a group for a delegating tool call.
pub struct OpenDelegation<'a> {
    pub tool_call_id: &'a str,
    pub delegating_agent_id: &'a str,
    pub target_agent_id: Option<String>,
    pub objective: Option<String>,
    pub depth: usize,
    pub timestamp_ms: i64,
}

impl DelegationTracker {
    pub fn group(&self, group_id: &str) -> Option<&DelegationGroup> {
        self.groups.get(group_id)
    }

    /// Innermost still-open delegation opened by `agent_id`.
    pub fn innermost_open(&self, agent_id: &str) -> Option<&DelegationGroup> {
        self.open_stacks
            .get(agent_id)
            .and_then(|stack| stack.last())
            .and_then(|group_id| self.groups.get(group_id))
    }

    pub fn open_depth(&self, agent_id: &str) -> usize {
        self.open_stacks.get(agent_id).map_or(0, Vec::len)
    }

    /// Group that rows authored by `agent_id` currently route into.
    pub fn route_for(&self, agent_id: &str) -> Option<&DelegationGroup> {
        self.active
            .values()
            .filter(|active| active.target_agent_id == agent_id)
            .max_by_key(|active| active.order)
            .and_then(|active| self.groups.get(&active.group_id))
            .filter(|group| group.is_in_progress())
    }

    pub fn open_group(&mut self, open: OpenDelegation<'_>) {
        if self.groups.contains_key(open.tool_call_id) {
            return;
        }
        let group_id = open.tool_call_id.to_string();
        let target_key = target_key(open.target_agent_id.as_deref()).to_string();
        self.groups.insert(
            group_id.clone(),
            DelegationGroup {
                id: group_id.clone(),
                delegating_tool_call_id: group_id.clone(),
                delegating_agent_id: open.delegating_agent_id.to_string(),
                delegation_id: None,
                target_agent_id: open.target_agent_id,
                objective: open.objective,
                child_session_id: None,
                status: DelegationStatus::InProgress,
                start_time_ms: open.timestamp_ms,
                end_time_ms: None,
                outcome: None,
                depth: open.depth,
                child_rows: Vec::new(),
                hydrated: false,
            },
        );
        self.open_stacks
            .entry(open.delegating_agent_id.to_string())
            .or_default()
            .push(group_id.clone());

        let parked = self
            .parked_requests
            .get_mut(&target_key)
            .and_then(VecDeque::pop_front)
            .or_else(|| {
                self.parked_requests
                    .get_mut(UNKNOWN_TARGET)
                    .and_then(VecDeque::pop_front)
            });
        match parked {
            Some(request) => self.correlate(&group_id, request),
            None => self
                .pending
                .entry(target_key)
                .or_default()
                .push_back(group_id),
        }
    }

    pub fn on_requested(
        &mut self,
        delegation_id: &str,
        target_agent_id: Option<&str>,
        objective: Option<&str>,
    ) {
        if self.by_delegation_id.contains_key(delegation_id) {
            return;
        }
        let request = ParkedRequest {
            delegation_id: delegation_id.to_string(),
            target_agent_id: target_agent_id.map(ToString::to_string),
            objective: objective.map(ToString::to_string),
        };
        let key = target_key(target_agent_id);
        let group_id = self
            .pending
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .or_else(|| {
                self.pending
                    .get_mut(UNKNOWN_TARGET)
                    .and_then(VecDeque::pop_front)
            });
        match group_id {
            Some(group_id) => self.correlate(&group_id, request),
            None => {
                tracing::debug!(delegation_id, "delegation requested before its tool call");
                self.parked_requests
                    .entry(key.to_string())
                    .or_default()
                    .push_back(request);
            }
        }
    }

    fn correlate(&mut self, group_id: &str, request: ParkedRequest) {
        let Some(group) = self.groups.get_mut(group_id) else {
            return;
        };
        group.delegation_id = Some(request.delegation_id.clone());
        if request.target_agent_id.is_some() {
            group.target_agent_id = request.target_agent_id;
        }
        if request.objective.is_some() {
            group.objective = request.objective;
        }
        self.by_delegation_id
            .insert(request.delegation_id.clone(), group_id.to_string());

        if let (true, Some(target)) = (group.is_in_progress(), group.target_agent_id.clone()) {
            self.activations += 1;
            self.active.insert(
                request.delegation_id.clone(),
                ActiveDelegation {
                    target_agent_id: target,
                    group_id: group_id.to_string(),
                    order: self.activations,
                },
            );
        }

        if let Some(child) = self.parked_forks.remove(&request.delegation_id) {
            self.attach_child_session(group_id, child);
        }
        if let Some(parked) = self.parked_outcomes.remove(&request.delegation_id) {
            self.finish_group(group_id, parked.status, parked.at_ms, parked.outcome);
        }
    }

    pub fn on_forked(&mut self, delegation_id: &str, child_session_id: &str) {
        match self.by_delegation_id.get(delegation_id).cloned() {
            Some(group_id) => self.attach_child_session(&group_id, child_session_id.to_string()),
            None => {
                self.parked_forks
                    .insert(delegation_id.to_string(), child_session_id.to_string());
            }
        }
    }

    fn attach_child_session(&mut self, group_id: &str, child_session_id: String) {
        if let Some(group) = self.groups.get_mut(group_id) {
            group.child_session_id = Some(child_session_id);
        }
    }

    pub fn on_finished(
        &mut self,
        delegation_id: &str,
        status: DelegationStatus,
        at_ms: i64,
        outcome: Option<String>,
    ) {
        match self.by_delegation_id.get(delegation_id).cloned() {
            Some(group_id) => self.finish_group(&group_id, status, at_ms, outcome),
            None => {
                tracing::debug!(delegation_id, "delegation finished before correlation");
                self.parked_outcomes.insert(
                    delegation_id.to_string(),
                    ParkedOutcome {
                        status,
                        at_ms,
                        outcome,
                    },
                );
            }
        }
    }

    /// Finalize a group, drop it from its originator's open stack, and stop
    /// routing its target agent into it.
    pub fn finish_group(
        &mut self,
        group_id: &str,
        status: DelegationStatus,
        at_ms: i64,
        outcome: Option<String>,
    ) {
        let Some(group) = self.groups.get_mut(group_id) else {
            return;
        };
        group.finish(status, at_ms, outcome);
        let delegating_agent = group.delegating_agent_id.clone();
        let delegation_id = group.delegation_id.clone();

        if let Some(stack) = self.open_stacks.get_mut(&delegating_agent) {
            stack.retain(|open| open != group_id);
        }
        if let Some(delegation_id) = delegation_id {
            self.active.remove(&delegation_id);
        }
    }

    pub fn into_groups(self) -> BTreeMap<String, DelegationGroup> {
        self.groups
    }
}

fn target_key(target_agent_id: Option<&str>) -> &str {
    target_agent_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(UNKNOWN_TARGET)
}
