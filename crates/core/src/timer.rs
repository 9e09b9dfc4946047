//! Session timer state machine.
//!
//! Timers are re-derived by replaying the whole ordered stream. The only
//! time-dependent part is the live delta, which callers add through
//! [`SessionTimers::global_elapsed_ms`] / [`SessionTimers::agent_elapsed_ms`]
//! with an explicit `now`.

use crate::event::{EventKind, FinishReason};
use crate::stream::OrderedEvent;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentTimer {
    pub accumulated_ms: i64,
    pub running_since_ms: Option<i64>,
    pub open_delegation_ids: BTreeSet<String>,
}

impl AgentTimer {
    pub fn is_running(&self) -> bool {
        self.running_since_ms.is_some()
    }

    pub fn is_delegating(&self) -> bool {
        !self.open_delegation_ids.is_empty()
    }

    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        live_elapsed(self.accumulated_ms, self.running_since_ms, now_ms)
    }

    fn start(&mut self, at_ms: i64) {
        if self.running_since_ms.is_none() {
            self.running_since_ms = Some(at_ms);
        }
    }

    fn pause(&mut self, at_ms: i64) {
        if let Some(since) = self.running_since_ms.take() {
            self.accumulated_ms = self.accumulated_ms.saturating_add(span_ms(since, at_ms));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalTimer {
    pub has_started: bool,
    pub accumulated_ms: i64,
    pub running_since_ms: Option<i64>,
}

impl GlobalTimer {
    pub fn is_running(&self) -> bool {
        self.running_since_ms.is_some()
    }

    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        live_elapsed(self.accumulated_ms, self.running_since_ms, now_ms)
    }
}

fn live_elapsed(accumulated_ms: i64, running_since_ms: Option<i64>, now_ms: i64) -> i64 {
    match running_since_ms {
        Some(since) => accumulated_ms.saturating_add(span_ms(since, now_ms)),
        None => accumulated_ms,
    }
}

/// Non-negative span between two timestamps, clamped at the `i64` bounds.
fn span_ms(from_ms: i64, to_ms: i64) -> i64 {
    to_ms.saturating_sub(from_ms).max(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionTimers {
    pub global: GlobalTimer,
    pub agents: BTreeMap<String, AgentTimer>,
    /// Timestamp of the last event folded.
    pub last_event_ms: Option<i64>,
}

impl SessionTimers {
    pub fn replay(events: &[OrderedEvent<'_>]) -> Self {
        let mut timers = Self::default();
        // delegation id -> agent that opened it
        let mut owners: HashMap<String, String> = HashMap::new();

        for event in events {
            let ts = event.timestamp_ms;
            let agent = event.agent_id.as_str();
            timers.last_event_ms = Some(ts);

            match &event.event.kind {
                EventKind::UserPrompt { .. } => {
                    timers.global.has_started = true;
                    if timers.global.running_since_ms.is_none() {
                        timers.global.running_since_ms = Some(ts);
                    }
                    let timer = timers.agent_mut(agent);
                    if !timer.is_delegating() {
                        timer.start(ts);
                    }
                }
                EventKind::LlmRequestStart => {
                    let timer = timers.agent_mut(agent);
                    if !timer.is_delegating() {
                        timer.start(ts);
                    }
                }
                EventKind::DelegationRequested { delegation_id, .. } => {
                    owners.insert(delegation_id.clone(), agent.to_string());
                    let timer = timers.agent_mut(agent);
                    timer.pause(ts);
                    timer.open_delegation_ids.insert(delegation_id.clone());
                }
                EventKind::DelegationCompleted { delegation_id, .. }
                | EventKind::DelegationFailed { delegation_id, .. } => {
                    let owner = owners
                        .remove(delegation_id)
                        .unwrap_or_else(|| agent.to_string());
                    let Some(timer) = timers.agents.get_mut(&owner) else {
                        tracing::debug!(
                            delegation_id = %delegation_id,
                            "delegation release for unknown agent"
                        );
                        continue;
                    };
                    if timer.open_delegation_ids.remove(delegation_id)
                        && timer.open_delegation_ids.is_empty()
                    {
                        timer.start(ts);
                    }
                }
                EventKind::LlmRequestEnd { finish_reason } => {
                    if !FinishReason::parse(finish_reason).hands_back() {
                        continue;
                    }
                    if let Some(timer) = timers.agents.get_mut(agent) {
                        if !timer.is_delegating() {
                            timer.pause(ts);
                        }
                    }
                }
                EventKind::SystemError { .. } => {
                    if event.has_explicit_agent() {
                        if let Some(timer) = timers.agents.get_mut(agent) {
                            timer.pause(ts);
                        }
                    } else {
                        for timer in timers.agents.values_mut() {
                            timer.pause(ts);
                        }
                    }
                }
                _ => {}
            }
        }

        // Global pause uses the last event seen, not the last working moment.
        if let (Some(since), Some(last)) = (timers.global.running_since_ms, timers.last_event_ms) {
            if !timers.agents.values().any(AgentTimer::is_running) {
                timers.global.accumulated_ms =
                    timers.global.accumulated_ms.saturating_add(span_ms(since, last));
                timers.global.running_since_ms = None;
            }
        }
        timers
    }

    fn agent_mut(&mut self, agent_id: &str) -> &mut AgentTimer {
        self.agents.entry(agent_id.to_string()).or_default()
    }

    pub fn global_elapsed_ms(&self, now_ms: i64) -> i64 {
        self.global.elapsed_ms(now_ms)
    }

    pub fn agent_elapsed_ms(&self, now_ms: i64) -> BTreeMap<String, i64> {
        self.agents
            .iter()
            .map(|(agent, timer)| (agent.clone(), timer.elapsed_ms(now_ms)))
            .collect()
    }

    /// True while any timer is running; the external tick stops otherwise.
    pub fn needs_tick(&self) -> bool {
        self.global.is_running() || self.agents.values().any(AgentTimer::is_running)
    }
}
