//! Bridge configuration.
//!
//! Stored as TOML; every field has a default, so an empty file (or no
//! file at all) yields the stock behaviour: a 100-line blocking input
//! channel, auto-resumed pauses and uncoordinated overlapping runs.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::input::{FullPolicy, DEFAULT_CAPACITY};

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME: &str = "runbridge-worker";

/// Commented configuration file written by `runbridge config --init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# runbridge configuration file

[input]
# Number of submitted lines the input channel buffers
capacity = 100

# What happens to a submitted line when the channel is full:
# "block" waits for the program to read, "drop" discards the line
when_full = "block"

[run]
# What happens when a program reaches a pause checkpoint:
# "auto-resume" continues immediately, "host" waits for resume/stop
pause = "auto-resume"

# What happens when a run starts while another is still going:
# "interleave" lets both run, "queue" waits for the earlier run,
# "supersede" cancels the earlier run
overlap = "interleave"

# Passed to the engine's analysis and execution phases
debug = false

# Worker threads are named "<thread_name>-<session id>"
thread_name = "runbridge-worker"

# Worker stack size in bytes (platform default when unset)
# stack_size = 8388608
"#;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Input channel settings
    pub input: InputSettings,
    /// Run lifecycle settings
    pub run: RunSettings,
}

impl BridgeConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from `path`, or fall back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Reject values the bridge cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.input.capacity == 0 {
            return Err(Error::Config(
                "input.capacity must be at least 1".to_string(),
            ));
        }
        if self.run.thread_name.trim().is_empty() {
            return Err(Error::Config("run.thread_name must not be empty".to_string()));
        }
        if self.run.stack_size == Some(0) {
            return Err(Error::Config("run.stack_size must not be 0".to_string()));
        }
        Ok(())
    }
}

/// Input channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Maximum number of buffered lines
    pub capacity: usize,
    /// Producer behaviour on a full channel
    pub when_full: FullPolicy,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            when_full: FullPolicy::Block,
        }
    }
}

/// Run lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Reaction to pause checkpoints
    pub pause: PausePolicy,
    /// Reaction to a run starting while another is in flight
    pub overlap: OverlapPolicy,
    /// Flag passed to `analyze` and `execute`
    pub debug: bool,
    /// Worker thread name prefix
    pub thread_name: String,
    /// Worker stack size in bytes
    pub stack_size: Option<usize>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            pause: PausePolicy::AutoResume,
            overlap: OverlapPolicy::Interleave,
            debug: false,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stack_size: None,
        }
    }
}

/// What the controller does when the engine pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PausePolicy {
    /// Resume immediately; pauses are invisible to the host
    AutoResume,
    /// Stay paused until the host calls `resume` or `stop`
    Host,
}

impl Default for PausePolicy {
    fn default() -> Self {
        Self::AutoResume
    }
}

impl FromStr for PausePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto-resume" | "auto" => Ok(Self::AutoResume),
            "host" => Ok(Self::Host),
            other => Err(Error::Config(format!(
                "unknown pause policy '{}' (expected auto-resume or host)",
                other
            ))),
        }
    }
}

/// What the controller does with a run that starts while another is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Start immediately; both runs share input and output
    Interleave,
    /// Start once every earlier run has finished
    Queue,
    /// Cancel every earlier run, then start
    Supersede,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        Self::Interleave
    }
}

impl FromStr for OverlapPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "interleave" => Ok(Self::Interleave),
            "queue" => Ok(Self::Queue),
            "supersede" => Ok(Self::Supersede),
            other => Err(Error::Config(format!(
                "unknown overlap policy '{}' (expected interleave, queue or supersede)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.input.capacity, 100);
        assert_eq!(config.input.when_full, FullPolicy::Block);
        assert_eq!(config.run.pause, PausePolicy::AutoResume);
        assert_eq!(config.run.overlap, OverlapPolicy::Interleave);
        assert!(!config.run.debug);
        assert_eq!(config.run.thread_name, "runbridge-worker");
        assert!(config.run.stack_size.is_none());
    }

    #[test]
    fn test_default_config_text_matches_defaults() {
        let parsed = BridgeConfig::from_toml_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(parsed, BridgeConfig::default());
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [input]
            when_full = "drop"

            [run]
            pause = "host"
            overlap = "supersede"
            "#,
        )
        .unwrap();
        assert_eq!(config.input.capacity, 100);
        assert_eq!(config.input.when_full, FullPolicy::Drop);
        assert_eq!(config.run.pause, PausePolicy::Host);
        assert_eq!(config.run.overlap, OverlapPolicy::Supersede);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = BridgeConfig::from_toml_str("[input]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_policy_is_a_parse_error() {
        let err = BridgeConfig::from_toml_str("[run]\npause = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = BridgeConfig::default();
        config.input.capacity = 8;
        config.run.overlap = OverlapPolicy::Queue;
        config.run.stack_size = Some(4 * 1024 * 1024);
        config.save(&path).unwrap();

        assert_eq!(BridgeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(BridgeConfig::load(&path), Err(Error::Config(_))));
        assert_eq!(BridgeConfig::load_or_default(&path), BridgeConfig::default());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("host".parse::<PausePolicy>().unwrap(), PausePolicy::Host);
        assert_eq!(
            "auto-resume".parse::<PausePolicy>().unwrap(),
            PausePolicy::AutoResume
        );
        assert_eq!("queue".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::Queue);
        assert!("later".parse::<OverlapPolicy>().is_err());
    }
}
