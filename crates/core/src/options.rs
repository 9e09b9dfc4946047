/// Agent key used when an event carries no usable agent id.
pub const DEFAULT_SENTINEL_AGENT_ID: &str = "unknown";

pub const DEFAULT_DELEGATION_TOOLS: &[&str] = &[
    "delegate",
    "delegate_task",
    "spawn_agent",
    "spawn_subagent",
    "Task",
];

pub const DEFAULT_TARGET_AGENT_KEYS: &[&str] = &[
    "agent_id",
    "agentId",
    "target_agent_id",
    "targetAgentId",
    "agent",
    "subagent_type",
];

const OBJECTIVE_KEYS: &[&str] = &["objective", "task", "prompt", "description"];

/// Knobs for a reconstruction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructOptions {
    pub sentinel_agent_id: String,
    /// Tool names (case-insensitive) that denote a delegation primitive.
    pub delegation_tools: Vec<String>,
    /// Argument keys probed, in order, for the delegation target agent.
    pub target_agent_keys: Vec<String>,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            sentinel_agent_id: DEFAULT_SENTINEL_AGENT_ID.to_string(),
            delegation_tools: DEFAULT_DELEGATION_TOOLS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            target_agent_keys: DEFAULT_TARGET_AGENT_KEYS
                .iter()
                .map(|key| (*key).to_string())
                .collect(),
        }
    }
}

impl ReconstructOptions {
    pub fn is_delegation_tool(&self, tool_name: &str) -> bool {
        let tool_name = tool_name.trim();
        self.delegation_tools
            .iter()
            .any(|name| name.eq_ignore_ascii_case(tool_name))
    }

    /// Normalise a raw agent id, substituting the sentinel for missing/blank values.
    pub fn agent_key(&self, raw: Option<&str>) -> String {
        raw.map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(self.sentinel_agent_id.as_str())
            .to_string()
    }

    pub fn target_agent_from_args(&self, arguments: &serde_json::Value) -> Option<String> {
        first_non_empty_str(arguments, self.target_agent_keys.iter().map(String::as_str))
    }

    pub fn objective_from_args(&self, arguments: &serde_json::Value) -> Option<String> {
        first_non_empty_str(arguments, OBJECTIVE_KEYS.iter().copied())
    }
}

fn first_non_empty_str<'a>(
    arguments: &serde_json::Value,
    keys: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    keys.into_iter().find_map(|key| {
        arguments
            .get(key)
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    })
}
