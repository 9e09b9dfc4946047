//! Streaming delta merger.
//!
//! Folds `assistant_content_delta` / `assistant_thinking_delta` events into a
//! single live accumulator per logical message, then finalizes it from the
//! terminal `assistant_message` event. All other events pass through in order.

use crate::event::EventKind;
use crate::stream::OrderedEvent;
use std::collections::HashMap;

/// One logical assistant message, possibly still streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedMessage {
    pub agent_id: String,
    /// Sequence of the first contributing event.
    pub sequence: u64,
    /// Timestamp of the first contributing event.
    pub timestamp_ms: i64,
    pub stream_message_id: Option<String>,
    pub content: String,
    pub thinking: String,
    /// True until the terminal stored event arrives.
    pub is_live: bool,
    pub delta_count: usize,
}

#[derive(Debug, Clone)]
pub enum MergedEvent<'a> {
    Source(OrderedEvent<'a>),
    Message(MergedMessage),
}

#[derive(Debug, Clone, Copy)]
enum Part {
    Content,
    Thinking,
}

#[derive(Default)]
struct StreamMerger<'a> {
    out: Vec<MergedEvent<'a>>,
    by_stream_id: HashMap<String, usize>,
    live_by_agent: HashMap<String, usize>,
    last_stored_sequence: Option<u64>,
}

/// Collapse streaming deltas into one entry per logical message.
pub fn merge_stream<'a>(events: &[OrderedEvent<'a>]) -> Vec<MergedEvent<'a>> {
    let mut merger = StreamMerger::default();
    for event in events {
        match &event.event.kind {
            EventKind::AssistantContentDelta {
                stream_message_id,
                delta,
            } => merger.accumulate(event, stream_message_id.as_deref(), delta, Part::Content),
            EventKind::AssistantThinkingDelta {
                stream_message_id,
                delta,
            } => merger.accumulate(event, stream_message_id.as_deref(), delta, Part::Thinking),
            EventKind::AssistantMessage {
                stream_message_id,
                content,
                thinking,
            } => merger.finalize(
                event,
                stream_message_id.as_deref(),
                content,
                thinking.as_deref(),
            ),
            _ => merger.out.push(MergedEvent::Source(event.clone())),
        }
    }
    merger.out
}

impl<'a> StreamMerger<'a> {
    fn message_mut(&mut self, idx: usize) -> Option<&mut MergedMessage> {
        match self.out.get_mut(idx) {
            Some(MergedEvent::Message(message)) => Some(message),
            _ => None,
        }
    }

    fn live_for_agent(&self, agent_id: &str) -> Option<usize> {
        self.live_by_agent.get(agent_id).copied()
    }

    fn accumulate(
        &mut self,
        event: &OrderedEvent<'a>,
        stream_message_id: Option<&str>,
        delta: &str,
        part: Part,
    ) {
        let target = match stream_message_id {
            Some(id) => self.by_stream_id.get(id).copied(),
            None => self.live_for_agent(&event.agent_id),
        };

        if let Some(idx) = target {
            let Some(message) = self.message_mut(idx) else {
                return;
            };
            if !message.is_live {
                tracing::debug!(
                    sequence = event.sequence(),
                    stream_message_id = ?stream_message_id,
                    "ignoring delta for finalized message"
                );
                return;
            }
            match part {
                Part::Content => message.content.push_str(delta),
                Part::Thinking => message.thinking.push_str(delta),
            }
            message.delta_count += 1;
            self.live_by_agent.insert(event.agent_id.clone(), idx);
            return;
        }

        let mut message = MergedMessage {
            agent_id: event.agent_id.clone(),
            sequence: event.sequence(),
            timestamp_ms: event.timestamp_ms,
            stream_message_id: stream_message_id.map(ToString::to_string),
            content: String::new(),
            thinking: String::new(),
            is_live: true,
            delta_count: 1,
        };
        match part {
            Part::Content => message.content.push_str(delta),
            Part::Thinking => message.thinking.push_str(delta),
        }
        let idx = self.out.len();
        self.out.push(MergedEvent::Message(message));
        if let Some(id) = stream_message_id {
            self.by_stream_id.insert(id.to_string(), idx);
        }
        self.live_by_agent.insert(event.agent_id.clone(), idx);
    }

    fn finalize(
        &mut self,
        event: &OrderedEvent<'a>,
        stream_message_id: Option<&str>,
        content: &str,
        thinking: Option<&str>,
    ) {
        let by_id = stream_message_id.and_then(|id| self.by_stream_id.get(id).copied());
        let target = by_id.or_else(|| {
            // Non-streaming fallback: only adopt an accumulator that has no id of its own.
            let idx = self.live_for_agent(&event.agent_id)?;
            match self.out.get(idx) {
                Some(MergedEvent::Message(m))
                    if stream_message_id.is_none() || m.stream_message_id.is_none() =>
                {
                    Some(idx)
                }
                _ => None,
            }
        });

        if let Some(idx) = target {
            let agent_id = event.agent_id.clone();
            let Some(message) = self.message_mut(idx) else {
                return;
            };
            if message.is_live {
                if !content.is_empty() {
                    message.content = content.to_string();
                }
                if message.thinking.is_empty() {
                    if let Some(thinking) = thinking {
                        message.thinking = thinking.to_string();
                    }
                }
                message.is_live = false;
                if message.stream_message_id.is_none() {
                    message.stream_message_id = stream_message_id.map(ToString::to_string);
                }
            }
            if self.live_by_agent.get(&agent_id) == Some(&idx) {
                self.live_by_agent.remove(&agent_id);
            }
            self.last_stored_sequence = Some(event.sequence());
            return;
        }

        if self
            .last_stored_sequence
            .is_some_and(|last| event.sequence() <= last)
        {
            tracing::debug!(
                sequence = event.sequence(),
                "skipping stored message at or below last applied sequence"
            );
            return;
        }
        self.last_stored_sequence = Some(event.sequence());

        let idx = self.out.len();
        self.out.push(MergedEvent::Message(MergedMessage {
            agent_id: event.agent_id.clone(),
            sequence: event.sequence(),
            timestamp_ms: event.timestamp_ms,
            stream_message_id: stream_message_id.map(ToString::to_string),
            content: content.to_string(),
            thinking: thinking.unwrap_or_default().to_string(),
            is_live: false,
            delta_count: 0,
        }));
        if let Some(id) = stream_message_id {
            self.by_stream_id.insert(id.to_string(), idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::options::ReconstructOptions;
    use crate::stream::order_events;

    fn ev(sequence: u64, agent: &str, kind: EventKind) -> Event {
        Event {
            sequence,
            session_id: "s1".to_string(),
            agent_id: Some(agent.to_string()),
            timestamp_ms: Some(sequence as i64 * 100),
            kind,
        }
    }

    fn content(sequence: u64, agent: &str, id: Option<&str>, delta: &str) -> Event {
        ev(
            sequence,
            agent,
            EventKind::AssistantContentDelta {
                stream_message_id: id.map(ToString::to_string),
                delta: delta.to_string(),
            },
        )
    }

    fn thinking(sequence: u64, agent: &str, id: Option<&str>, delta: &str) -> Event {
        ev(
            sequence,
            agent,
            EventKind::AssistantThinkingDelta {
                stream_message_id: id.map(ToString::to_string),
                delta: delta.to_string(),
            },
        )
    }

    fn stored(
        sequence: u64,
        agent: &str,
        id: Option<&str>,
        text: &str,
        thinking: Option<&str>,
    ) -> Event {
        ev(
            sequence,
            agent,
            EventKind::AssistantMessage {
                stream_message_id: id.map(ToString::to_string),
                content: text.to_string(),
                thinking: thinking.map(ToString::to_string),
            },
        )
    }

    fn messages(events: &[Event]) -> Vec<MergedMessage> {
        let ordered = order_events("s1", events, &ReconstructOptions::default());
        merge_stream(&ordered)
            .into_iter()
            .filter_map(|entry| match entry {
                MergedEvent::Message(message) => Some(message),
                MergedEvent::Source(_) => None,
            })
            .collect()
    }

    #[test]
    fn deltas_collapse_into_one_live_message() {
        let events = vec![
            content(1, "a", Some("m1"), "Hel"),
            content(2, "a", Some("m1"), "lo"),
            content(3, "a", Some("m1"), "!"),
        ];
        let merged = messages(&events);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "Hello!");
        assert!(merged[0].is_live);
        assert_eq!(merged[0].delta_count, 3);
        assert_eq!(merged[0].sequence, 1);
    }

    #[test]
    fn stored_event_finalizes_and_keeps_streamed_thinking() {
        let events = vec![
            thinking(1, "a", Some("m1"), "plan "),
            thinking(2, "a", Some("m1"), "carefully"),
            content(3, "a", Some("m1"), "draft"),
            stored(4, "a", Some("m1"), "final answer", None),
        ];
        let merged = messages(&events);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].is_live);
        assert_eq!(merged[0].content, "final answer");
        assert_eq!(merged[0].thinking, "plan carefully");
    }

    #[test]
    fn empty_stored_content_keeps_concatenated_deltas() {
        let events = vec![
            content(1, "a", Some("m1"), "a"),
            content(2, "a", Some("m1"), "b"),
            stored(3, "a", Some("m1"), "", Some("late thinking")),
        ];
        let merged = messages(&events);
        assert_eq!(merged[0].content, "ab");
        assert_eq!(merged[0].thinking, "late thinking");
    }

    #[test]
    fn different_stream_ids_do_not_merge() {
        let events = vec![
            content(1, "a", Some("m1"), "first"),
            content(2, "a", Some("m2"), "second"),
            content(3, "a", Some("m1"), "+"),
        ];
        let merged = messages(&events);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "first+");
        assert_eq!(merged[1].content, "second");
    }

    #[test]
    fn idless_deltas_follow_latest_live_for_agent() {
        let events = vec![
            content(1, "a", None, "x"),
            content(2, "b", None, "other"),
            content(3, "a", None, "y"),
            stored(4, "a", None, "xy!", None),
        ];
        let merged = messages(&events);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "xy!");
        assert!(!merged[0].is_live);
        assert!(merged[1].is_live);
    }

    #[test]
    fn stored_without_accumulator_appends_once() {
        let events = vec![
            stored(1, "a", None, "one-shot", Some("why")),
            stored(1, "a", None, "one-shot", Some("why")),
        ];
        let merged = messages(&events);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "one-shot");
        assert_eq!(merged[0].thinking, "why");
        assert!(!merged[0].is_live);
    }

    #[test]
    fn stored_with_unknown_id_does_not_steal_other_stream() {
        let events = vec![
            content(1, "a", Some("m1"), "streaming"),
            stored(2, "a", Some("m9"), "separate", None),
        ];
        let merged = messages(&events);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].is_live);
        assert_eq!(merged[1].content, "separate");
    }
}
