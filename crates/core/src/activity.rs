use crate::event::{EventKind, FinishReason};
use crate::stream::OrderedEvent;
use serde::Serialize;
use std::collections::BTreeSet;

/// Which agents have a model request in flight, and whether the
/// conversation has been handed back to the user for good.
///
/// Normally produced by the transport; [`ActivitySignal::derive`] rebuilds it
/// from the same event kinds when no live signal is available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivitySignal {
    pub thinking_agents: BTreeSet<String>,
    pub conversation_complete: bool,
}

impl ActivitySignal {
    pub fn derive(events: &[OrderedEvent<'_>]) -> Self {
        let mut thinking = BTreeSet::new();
        let mut root_agent: Option<&str> = None;
        let mut root_handed_back = false;

        for event in events {
            let agent = event.agent_id.as_str();
            match &event.event.kind {
                EventKind::UserPrompt { .. } => {
                    root_agent.get_or_insert(agent);
                    if root_agent == Some(agent) {
                        root_handed_back = false;
                    }
                    thinking.insert(agent.to_string());
                }
                EventKind::LlmRequestStart => {
                    if root_agent == Some(agent) {
                        root_handed_back = false;
                    }
                    thinking.insert(agent.to_string());
                }
                EventKind::LlmRequestEnd { finish_reason } => {
                    if FinishReason::parse(finish_reason).hands_back() {
                        thinking.remove(agent);
                        if root_agent == Some(agent) {
                            root_handed_back = true;
                        }
                    }
                }
                EventKind::SystemError { .. } => {
                    if event.has_explicit_agent() {
                        thinking.remove(agent);
                    } else {
                        thinking.clear();
                    }
                }
                _ => {}
            }
        }

        Self {
            conversation_complete: root_handed_back && thinking.is_empty(),
            thinking_agents: thinking,
        }
    }

    pub fn is_thinking(&self, agent_id: &str) -> bool {
        self.thinking_agents.contains(agent_id)
    }

    pub fn is_session_active(&self) -> bool {
        !self.thinking_agents.is_empty() && !self.conversation_complete
    }
}
