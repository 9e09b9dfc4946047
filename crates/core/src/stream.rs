//! Ordering and at-least-once dedup for session event streams.
//!
//! The dedup rule is a per-session high-water mark: an event whose sequence
//! number is at or below the highest sequence already applied for its session
//! is dropped. Replay batches are sequence-sorted before gating, so a batch
//! delivered out of order still applies every event once.

use crate::event::Event;
use crate::options::ReconstructOptions;
use std::collections::{BTreeMap, HashMap};

/// An event admitted into a reconstruction pass, with resolved defaults.
#[derive(Debug, Clone)]
pub struct OrderedEvent<'a> {
    pub event: &'a Event,
    /// Own agent id, or the sentinel key.
    pub agent_id: String,
    /// Own timestamp, or the previous admitted event's, or 0.
    pub timestamp_ms: i64,
}

impl OrderedEvent<'_> {
    pub fn sequence(&self) -> u64 {
        self.event.sequence
    }

    /// Whether the envelope named an agent (as opposed to the sentinel fallback).
    pub fn has_explicit_agent(&self) -> bool {
        self.event
            .agent_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }
}

/// Filter to one session, sort by sequence, drop redelivered events, and
/// resolve missing agent ids / timestamps.
pub fn order_events<'a>(
    session_id: &str,
    events: &'a [Event],
    options: &ReconstructOptions,
) -> Vec<OrderedEvent<'a>> {
    let mut in_session: Vec<&'a Event> = Vec::with_capacity(events.len());
    for event in events {
        if event.session_id == session_id {
            in_session.push(event);
        } else {
            tracing::debug!(
                session = %session_id,
                foreign = %event.session_id,
                sequence = event.sequence,
                "skipping event from another session"
            );
        }
    }
    in_session.sort_by_key(|event| event.sequence);

    let mut out = Vec::with_capacity(in_session.len());
    let mut high_water: Option<u64> = None;
    let mut last_timestamp = 0i64;
    for event in in_session {
        if high_water.is_some_and(|high| event.sequence <= high) {
            tracing::debug!(
                session = %session_id,
                sequence = event.sequence,
                "dropping redelivered event"
            );
            continue;
        }
        high_water = Some(event.sequence);

        let timestamp_ms = event.timestamp_ms.unwrap_or(last_timestamp);
        last_timestamp = timestamp_ms;
        out.push(OrderedEvent {
            event,
            agent_id: options.agent_key(event.agent_id.as_deref()),
            timestamp_ms,
        });
    }
    out
}

/// Result of offering one event to an [`EventLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied,
    /// Same sequence number already committed.
    Duplicate,
    /// Lower than the session's high-water mark but never seen.
    Stale,
}

/// Incremental, multi-session append buffer fed by a transport.
///
/// Committed events are never mutated; `generation` changes on every applied
/// event so callers can memoize derived views on it.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    sessions: BTreeMap<String, Vec<Event>>,
    high_water: HashMap<String, u64>,
    generation: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, event: Event) -> IngestOutcome {
        if let Some(&high) = self.high_water.get(&event.session_id) {
            if event.sequence <= high {
                let seen = self
                    .sessions
                    .get(&event.session_id)
                    .is_some_and(|events| {
                        events
                            .binary_search_by_key(&event.sequence, |e| e.sequence)
                            .is_ok()
                    });
                let outcome = if seen {
                    IngestOutcome::Duplicate
                } else {
                    IngestOutcome::Stale
                };
                tracing::debug!(
                    session = %event.session_id,
                    sequence = event.sequence,
                    high_water = high,
                    ?outcome,
                    "event not applied"
                );
                return outcome;
            }
        }

        self.high_water
            .insert(event.session_id.clone(), event.sequence);
        self.sessions
            .entry(event.session_id.clone())
            .or_default()
            .push(event);
        self.generation += 1;
        IngestOutcome::Applied
    }

    /// Ingest a replay batch; the batch is sequence-sorted first.
    pub fn ingest_batch(&mut self, mut batch: Vec<Event>) -> usize {
        batch.sort_by(|a, b| {
            a.session_id
                .cmp(&b.session_id)
                .then(a.sequence.cmp(&b.sequence))
        });
        batch
            .into_iter()
            .map(|event| self.ingest(event))
            .filter(|outcome| *outcome == IngestOutcome::Applied)
            .count()
    }

    pub fn events(&self, session_id: &str) -> &[Event] {
        self.sessions
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every committed event, grouped by session id.
    pub fn all_events(&self) -> Vec<Event> {
        self.sessions.values().flatten().cloned().collect()
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn high_water(&self, session_id: &str) -> Option<u64> {
        self.high_water.get(session_id).copied()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
