use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{zlog_debug, Error, Result};

/// Default cap on simultaneously registered subagents.
pub const DEFAULT_MAX_CONCURRENT_AGENTS: usize = 5;

/// Default per-task timeout handed to subagents (10 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default bound on awaiting a subagent's own termination.
pub const DEFAULT_TERMINATION_TIMEOUT_MS: u64 = 30_000;

/// Options recognized by the orchestrator.
///
/// `default_timeout_secs` and `auto_checkpoint` are not enforced here; they are
/// passed through to subagents via [`SubagentConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrent_agents: usize,
    pub default_timeout_secs: u64,
    pub auto_checkpoint: bool,
    pub verbose: bool,
    /// `0` waits for a subagent's termination indefinitely.
    pub termination_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: DEFAULT_MAX_CONCURRENT_AGENTS,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            auto_checkpoint: false,
            verbose: false,
            termination_timeout_ms: DEFAULT_TERMINATION_TIMEOUT_MS,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_concurrent_agents(mut self, max: usize) -> Self {
        self.max_concurrent_agents = max;
        self
    }

    pub fn with_termination_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.termination_timeout_ms = timeout.map_or(0, |d| (d.as_millis() as u64).max(1));
        self
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn termination_timeout(&self) -> Option<Duration> {
        match self.termination_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Per-spawn overrides. Unset fields fall back to the orchestrator defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubagentConfig {
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub auto_checkpoint: bool,
}

impl SubagentConfig {
    /// Fill unset fields from the orchestrator configuration.
    pub fn resolve(&self, defaults: &OrchestratorConfig) -> SubagentConfig {
        SubagentConfig {
            timeout: Some(self.timeout.unwrap_or_else(|| defaults.default_timeout())),
            model: self.model.clone(),
            max_turns: self.max_turns,
            auto_checkpoint: self.auto_checkpoint || defaults.auto_checkpoint,
        }
    }
}

/// On-disk configuration at `~/.crew/crew.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Command used by the Claude backend (defaults to `claude`).
    pub command: Option<String>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    pub fn crew_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".crew"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::crew_dir()?.join("crew.toml"))
    }

    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or("claude")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        zlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            zlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        zlog_debug!(
            "Config loaded: max_concurrent_agents={}, verbose={}, command={:?}",
            config.orchestrator.max_concurrent_agents,
            config.orchestrator.verbose,
            config.command
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        zlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }
}
