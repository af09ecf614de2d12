//! Agent configuration, persisted as TOML.
//!
//! Every field has a serde default, so a config file only needs to name the
//! settings it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, HekaResult};

/// How the decider picks among mutually indifferent candidates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Always the first candidate in preference order. Fully deterministic.
    First,
    /// Uniformly random among the candidates.
    Uniform,
    /// Random, weighted by each candidate's combined numeric-indifferent value.
    /// Candidates without a numeric value get weight zero; if no candidate has
    /// positive weight the choice is uniform.
    Weighted,
    /// Highest numeric value with probability `1 - epsilon`, otherwise uniform.
    EpsilonGreedy { epsilon: f64 },
}

/// How several numeric-indifferent values for one candidate are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumericCombination {
    Sum,
    Avg,
}

/// Configuration for an [`Agent`](crate::agent::Agent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name, used in log output.
    #[serde(default = "default_name")]
    pub name: String,
    /// Indifferent selection policy.
    #[serde(default = "default_selection")]
    pub selection: SelectionPolicy,
    /// Seed for the selection RNG. `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Combination of numeric-indifferent values.
    #[serde(default = "default_numeric_combination")]
    pub numeric_combination: NumericCombination,
    /// Maximum elaboration waves per decision cycle.
    #[serde(default = "default_max_elaborations")]
    pub max_elaborations: usize,
    /// Maximum goal stack depth before the agent halts.
    #[serde(default = "default_max_goal_depth")]
    pub max_goal_depth: u32,
    /// Suppress state no-change impasses on operator slots with no preferences.
    #[serde(default = "default_true")]
    pub wait_on_state_no_change: bool,
}

fn default_name() -> String {
    "heka".into()
}
fn default_selection() -> SelectionPolicy {
    SelectionPolicy::First
}
fn default_numeric_combination() -> NumericCombination {
    NumericCombination::Sum
}
fn default_max_elaborations() -> usize {
    100
}
fn default_max_goal_depth() -> u32 {
    100
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            selection: default_selection(),
            seed: None,
            numeric_combination: default_numeric_combination(),
            max_elaborations: default_max_elaborations(),
            max_goal_depth: default_max_goal_depth(),
            wait_on_state_no_change: true,
        }
    }
}

impl AgentConfig {
    /// Create a config with a specific name (other fields default).
    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Check limits and policy parameters.
    pub fn validate(&self) -> HekaResult<()> {
        if self.max_elaborations == 0 {
            return Err(ConfigError::Invalid {
                message: "max_elaborations must be at least 1".into(),
            }
            .into());
        }
        if self.max_goal_depth < 2 {
            return Err(ConfigError::Invalid {
                message: "max_goal_depth must allow at least one substate".into(),
            }
            .into());
        }
        match self.selection {
            SelectionPolicy::EpsilonGreedy { epsilon } if !(0.0..=1.0).contains(&epsilon) => {
                Err(ConfigError::Invalid {
                    message: format!("epsilon {epsilon} is outside [0, 1]"),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> HekaResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> HekaResult<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> HekaResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::Serialize {
                message: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.selection, SelectionPolicy::First);
        assert!(config.wait_on_state_no_change);
    }

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");

        let config = AgentConfig {
            selection: SelectionPolicy::EpsilonGreedy { epsilon: 0.1 },
            seed: Some(42),
            numeric_combination: NumericCombination::Avg,
            ..AgentConfig::with_name("roundtrip")
        };
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "name = \"sparse\"\nseed = 7\n").unwrap();

        let loaded = AgentConfig::load(&path).unwrap();
        assert_eq!(loaded.name, "sparse");
        assert_eq!(loaded.seed, Some(7));
        assert_eq!(loaded.max_elaborations, 100);
    }

    #[test]
    fn invalid_epsilon_rejected() {
        let config = AgentConfig {
            selection: SelectionPolicy::EpsilonGreedy { epsilon: 1.5 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = AgentConfig::load(Path::new("/nonexistent/agent.toml")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::HekaError::Config(ConfigError::Read { .. })
        ));
    }
}
