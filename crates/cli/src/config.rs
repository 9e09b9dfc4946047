use agentlens_core::ReconstructOptions;
use agentlens_core::options::{DEFAULT_DELEGATION_TOOLS, DEFAULT_TARGET_AGENT_KEYS};
use agentlens_runtime_config::{AgentlensConfig, CONFIG_FILE_NAME, apply_compat_fallbacks};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Get the config directory path (~/.config/agentlens/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("agentlens"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn read_config_doc(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let doc = toml::from_str::<toml::Value>(&content)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(doc)
}

fn load_runtime_config_from_doc(doc: &toml::Value, path: &Path) -> Result<AgentlensConfig> {
    let mut config = doc
        .clone()
        .try_into::<AgentlensConfig>()
        .with_context(|| format!("Invalid config at {}", path.display()))?;
    if apply_compat_fallbacks(&mut config, Some(doc)) {
        tracing::debug!(path = %path.display(), "applied config compatibility fallbacks");
    }
    Ok(config)
}

/// Load config from `explicit`, else the canonical path when present, else defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<AgentlensConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_path() {
            Ok(path) if path.exists() => path,
            _ => return Ok(AgentlensConfig::default()),
        },
    };
    let doc = read_config_doc(&path)?;
    load_runtime_config_from_doc(&doc, &path)
}

fn or_defaults(configured: &[String], defaults: &[&str]) -> Vec<String> {
    if configured.is_empty() {
        defaults.iter().map(|name| (*name).to_string()).collect()
    } else {
        configured.to_vec()
    }
}

pub fn reconstruct_options(config: &AgentlensConfig) -> ReconstructOptions {
    ReconstructOptions {
        sentinel_agent_id: config.engine.sentinel_agent_id.clone(),
        delegation_tools: or_defaults(&config.engine.delegation_tools, DEFAULT_DELEGATION_TOOLS),
        target_agent_keys: or_defaults(&config.engine.target_agent_keys, DEFAULT_TARGET_AGENT_KEYS),
    }
}

/// Print the effective config as TOML.
pub fn show_config(config: &AgentlensConfig) -> Result<()> {
    let path = config_path()?;
    println!("# Config file: {}", path.display());
    let mut effective = config.clone();
    let options = reconstruct_options(config);
    effective.engine.delegation_tools = options.delegation_tools;
    effective.engine.target_agent_keys = options.target_agent_keys;
    let content = toml::to_string_pretty(&effective).context("Failed to serialize config")?;
    print!("{content}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_engine_lists_fall_back_to_builtins() {
        let options = reconstruct_options(&AgentlensConfig::default());
        assert_eq!(options, ReconstructOptions::default());
    }

    #[test]
    fn explicit_config_is_loaded_and_normalized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
[engine]
sentinel_agent_id = "anon"
delegation_tools = [" handoff ", "handoff"]

[timer]
tick_interval_ms = 0
"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config.timer.tick_interval_ms, 1_000);
        let options = reconstruct_options(&config);
        assert_eq!(options.sentinel_agent_id, "anon");
        assert_eq!(options.delegation_tools, vec!["handoff".to_string()]);
        assert!(options.is_delegation_tool("HANDOFF"));
        assert!(!options.is_delegation_tool("delegate"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config"));
    }
}
