//! Taskweave configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Runtime resource limits
    pub limits: LimitsConfig,

    /// Optional directory of YAML template packs loaded at startup
    #[serde(rename = "templates-dir", skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `.taskweave.yml`, then
    /// `~/.config/taskweave/taskweave.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".taskweave.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskweave").join("taskweave.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

/// Session and evaluator resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Assistant turns per Handler session
    #[serde(rename = "max-turns")]
    pub max_turns: u32,

    /// Fraction of the model context window a session may consume
    #[serde(rename = "max-context-window-fraction")]
    pub max_context_window_fraction: f64,

    /// Tool executions within one user turn
    #[serde(rename = "max-tool-calls-per-turn")]
    pub max_tool_calls_per_turn: u32,

    /// Nested CONTINUATION depth in the evaluator
    #[serde(rename = "max-subtask-depth")]
    pub max_subtask_depth: u32,

    /// Wall-clock budget for one user turn, milliseconds
    #[serde(rename = "turn-timeout-ms")]
    pub turn_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_context_window_fraction: 0.8,
            max_tool_calls_per_turn: 8,
            max_subtask_depth: 10,
            turn_timeout_ms: 600_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.limits.max_turns, 10);
        assert_eq!(config.limits.max_tool_calls_per_turn, 8);
        assert_eq!(config.limits.max_subtask_depth, 10);
        assert!((config.limits.max_context_window_fraction - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: anthropic
  model: claude-opus-4
  api-key-env: MY_API_KEY
  max-tokens: 8192

limits:
  max-turns: 5
  max-tool-calls-per-turn: 3
  max-subtask-depth: 4
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "claude-opus-4");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.limits.max_turns, 5);
        assert_eq!(config.limits.max_tool_calls_per_turn, 3);
        assert_eq!(config.limits.max_subtask_depth, 4);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
limits:
  max-turns: 2
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.limits.max_turns, 2);
        assert_eq!(config.limits.max_tool_calls_per_turn, 8);
        assert_eq!(config.llm.provider, "anthropic");
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("tw.yml");
        std::fs::write(&path, "limits:\n  max-turns: 7\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.limits.max_turns, 7);
    }
}
