//! Runtime configuration types for the agentlens CLI.
//!
//! The CLI reads `agentlens.toml` into [`AgentlensConfig`]. Every field has a
//! serde default so partial files load, and [`apply_compat_fallbacks`]
//! normalises values that would otherwise break the engine.

use serde::{Deserialize, Serialize};

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "agentlens.toml";

/// Top-level configuration (persisted as `agentlens.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AgentlensConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub timer: TimerSettings,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// Agent key substituted for missing or blank agent ids.
    #[serde(default = "default_sentinel_agent_id")]
    pub sentinel_agent_id: String,
    /// Tool names treated as delegation primitives. Empty means built-in list.
    #[serde(default)]
    pub delegation_tools: Vec<String>,
    /// Argument keys probed for the delegation target. Empty means built-in list.
    #[serde(default)]
    pub target_agent_keys: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sentinel_agent_id: default_sentinel_agent_id(),
            delegation_tools: Vec::new(),
            target_agent_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerSettings {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSettings {
    /// Default `tracing` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OutputSettings {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "plain", alias = "pretty")]
    Text,
    #[serde(alias = "jsonl", alias = "ndjson")]
    Json,
    /// Unknown values are normalized by compatibility fallbacks.
    #[serde(other)]
    Unknown,
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_sentinel_agent_id() -> String {
    "unknown".to_string()
}
fn default_tick_interval_ms() -> u64 {
    1_000
}
fn default_log_filter() -> String {
    "warn".to_string()
}

/// Apply compatibility fallbacks after loading raw TOML.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut AgentlensConfig, root: Option<&toml::Value>) -> bool {
    let mut changed = false;

    // Older files kept the tick under `[watch] interval_ms`.
    let has_timer_table = root.is_some_and(|root| root.get("timer").is_some());
    if !has_timer_table {
        let legacy_tick = root
            .and_then(|root| root.get("watch"))
            .and_then(|watch| watch.get("interval_ms"))
            .and_then(toml::Value::as_integer)
            .and_then(|ms| u64::try_from(ms).ok());
        if let Some(ms) = legacy_tick {
            config.timer.tick_interval_ms = ms;
            changed = true;
        }
    }

    if config.timer.tick_interval_ms == 0 {
        config.timer.tick_interval_ms = default_tick_interval_ms();
        changed = true;
    }

    let sentinel = config.engine.sentinel_agent_id.trim().to_string();
    if sentinel.is_empty() {
        config.engine.sentinel_agent_id = default_sentinel_agent_id();
        changed = true;
    } else if sentinel.len() != config.engine.sentinel_agent_id.len() {
        config.engine.sentinel_agent_id = sentinel;
        changed = true;
    }

    changed |= normalize_names(&mut config.engine.delegation_tools);
    changed |= normalize_names(&mut config.engine.target_agent_keys);

    if config.output.format == OutputFormat::Unknown {
        config.output.format = OutputFormat::Text;
        changed = true;
    }

    if config.log.filter.trim().is_empty() {
        config.log.filter = default_log_filter();
        changed = true;
    }

    changed
}

/// Trim entries, drop blanks and repeats. Returns true when the list changed.
fn normalize_names(names: &mut Vec<String>) -> bool {
    let mut cleaned: Vec<String> = Vec::with_capacity(names.len());
    for name in names.iter() {
        let name = name.trim();
        if !name.is_empty() && !cleaned.iter().any(|seen| seen == name) {
            cleaned.push(name.to_string());
        }
    }
    if cleaned == *names {
        return false;
    }
    *names = cleaned;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = AgentlensConfig::default();
        assert_eq!(cfg.engine.sentinel_agent_id, "unknown");
        assert!(cfg.engine.delegation_tools.is_empty());
        assert_eq!(cfg.timer.tick_interval_ms, 1_000);
        assert_eq!(cfg.log.filter, "warn");
        assert_eq!(cfg.output.format, OutputFormat::Text);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: AgentlensConfig = toml::from_str(
            r#"
[engine]
delegation_tools = ["delegate", "handoff"]
"#,
        )
        .expect("parse toml");
        assert_eq!(cfg.engine.delegation_tools, vec!["delegate", "handoff"]);
        assert_eq!(cfg.engine.sentinel_agent_id, "unknown");
        assert_eq!(cfg.timer.tick_interval_ms, 1_000);
    }

    #[test]
    fn output_format_aliases_are_accepted() {
        let cfg: AgentlensConfig = toml::from_str(
            r#"
[output]
format = "ndjson"
"#,
        )
        .expect("parse toml");
        assert_eq!(cfg.output.format, OutputFormat::Json);

        let cfg: AgentlensConfig = toml::from_str(
            r#"
[output]
format = "yaml"
"#,
        )
        .expect("parse toml");
        assert_eq!(cfg.output.format, OutputFormat::Unknown);
    }

    #[test]
    fn apply_compat_fallbacks_repairs_bad_values() {
        let raw = r#"
[engine]
sentinel_agent_id = "  "
delegation_tools = [" delegate ", "", "delegate", "Task"]

[timer]
tick_interval_ms = 0

[output]
format = "yaml"
"#;
        let mut cfg: AgentlensConfig = toml::from_str(raw).expect("parse toml");
        let root: toml::Value = toml::from_str(raw).expect("parse toml");

        assert!(apply_compat_fallbacks(&mut cfg, Some(&root)));
        assert_eq!(cfg.engine.sentinel_agent_id, "unknown");
        assert_eq!(cfg.engine.delegation_tools, vec!["delegate", "Task"]);
        assert_eq!(cfg.timer.tick_interval_ms, 1_000);
        assert_eq!(cfg.output.format, OutputFormat::Text);
    }

    #[test]
    fn legacy_watch_interval_is_migrated() {
        let raw = r#"
[watch]
interval_ms = 250
"#;
        let mut cfg: AgentlensConfig = toml::from_str(raw).expect("parse toml");
        let root: toml::Value = toml::from_str(raw).expect("parse toml");

        assert!(apply_compat_fallbacks(&mut cfg, Some(&root)));
        assert_eq!(cfg.timer.tick_interval_ms, 250);
    }

    #[test]
    fn apply_compat_fallbacks_is_noop_for_modern_values() {
        let mut cfg = AgentlensConfig::default();
        cfg.engine.delegation_tools = vec!["delegate".to_string()];
        let root: toml::Value = toml::from_str(
            r#"
[timer]
tick_interval_ms = 1000
"#,
        )
        .expect("parse toml");

        let before = cfg.clone();
        assert!(!apply_compat_fallbacks(&mut cfg, Some(&root)));
        assert_eq!(cfg, before);
    }

    #[test]
    fn config_serializes_every_section() {
        let encoded = toml::to_string(&AgentlensConfig::default()).expect("serialize config");
        assert!(encoded.contains("[engine]"));
        assert!(encoded.contains("tick_interval_ms = 1000"));
        assert!(encoded.contains("format = \"text\""));
    }
}
