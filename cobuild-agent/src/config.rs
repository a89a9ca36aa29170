//! Configuration loading for the COBUILD agent.
//!
//! Settings come from an optional TOML file (`--config` or
//! `COBUILD_AGENT_CONFIG`) and are then overridden by command line flags.
//! Every section has defaults so an agent can run from flags alone.

use clap::Parser;
use cobuild_core::{agent_name, ConfigError, PairId, Role};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// COMMAND LINE
// ============================================================================

#[derive(Parser, Debug, Default)]
#[command(name = "cobuild-agent")]
#[command(version, about = "Paired building agent driven by a local planner", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "COBUILD_AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Pair id (>= 1)
    #[arg(long, allow_negative_numbers = true)]
    pub pair: Option<i64>,

    /// Role inside the pair (A or B)
    #[arg(long)]
    pub role: Option<Role>,

    /// In-world name, defaults to Bot-{pair}-{role}
    #[arg(long)]
    pub name: Option<String>,

    /// Base URL of the coordination hub
    #[arg(long, env = "COBUILD_HUB_URL")]
    pub hub_url: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    pub log_json: bool,
}

// ============================================================================
// FILE SECTIONS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub identity: IdentityConfig,
    pub hub: HubSection,
    pub resolve: ResolveConfig,
    pub cycle: CycleConfig,
    pub deadline: DeadlineConfig,
    pub planner: PlannerSection,
    pub world: WorldSection,
    pub archive: ArchiveSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub pair: Option<i64>,
    pub role: Option<Role>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubSection {
    pub url: String,
    pub request_timeout_ms: u64,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Backoff used while the hub cannot be reached.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolveConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            initial_ms: 2_000,
            max_ms: 10_000,
            multiplier: 1.5,
            max_attempts: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CycleConfig {
    pub period_ms: u64,
    /// How many partner messages go into each prompt.
    pub partner_window: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_ms: 15_000,
            partner_window: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeadlineConfig {
    /// Seconds from process start until checkpoint and exit.
    pub after_secs: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self { after_secs: 3_300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerSection {
    pub endpoint: String,
    pub model: String,
    pub timeout_ms: u64,
    pub json_mode: bool,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/api/generate".to_string(),
            model: "llama3".to_string(),
            timeout_ms: 60_000,
            json_mode: true,
        }
    }
}

/// RCON connection to the world server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldSection {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub spawn_timeout_ms: u64,
    pub command_timeout_ms: u64,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25575,
            password: String::new(),
            spawn_timeout_ms: 30_000,
            command_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    #[default]
    None,
    Git,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSection {
    pub mode: ArchiveMode,
    /// Where `progress_p{n}.json` is written.
    pub checkpoint_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub remote: String,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
    pub command_timeout_ms: u64,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        Self {
            mode: ArchiveMode::None,
            checkpoint_dir: PathBuf::from("."),
            repo_dir: PathBuf::from("."),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            author_name: "AI-Builder".to_string(),
            author_email: "bot@example.com".to_string(),
            command_timeout_ms: 60_000,
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Who this agent is, resolved from config and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub pair: PairId,
    pub role: Role,
    pub name: String,
    /// Partner's name by convention; not authenticated.
    pub partner: String,
}

impl AgentIdentity {
    pub fn new(pair: PairId, role: Role, name: Option<String>) -> Self {
        Self {
            pair,
            role,
            name: name.unwrap_or_else(|| agent_name(pair, role)),
            partner: agent_name(pair, role.partner()),
        }
    }
}

impl AgentConfig {
    /// Load the file named by `cli` (if any), apply flag overrides, validate.
    pub fn load(cli: &Cli) -> Result<Self, AgentConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, AgentConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| AgentConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, AgentConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(pair) = cli.pair {
            self.identity.pair = Some(pair);
        }
        if let Some(role) = cli.role {
            self.identity.role = Some(role);
        }
        if let Some(name) = &cli.name {
            self.identity.name = Some(name.clone());
        }
        if let Some(url) = &cli.hub_url {
            self.hub.url = url.clone();
        }
    }

    pub fn identity(&self) -> Result<AgentIdentity, ConfigError> {
        let raw_pair = self.identity.pair.ok_or_else(|| ConfigError::MissingRequired {
            field: "identity.pair".to_string(),
        })?;
        let pair = PairId::new(raw_pair)?;
        let role = self.identity.role.ok_or_else(|| ConfigError::MissingRequired {
            field: "identity.role".to_string(),
        })?;
        let name = self
            .identity
            .name
            .clone()
            .filter(|n| !n.trim().is_empty());
        Ok(AgentIdentity::new(pair, role, name))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.identity()?;
        if self.hub.url.trim().is_empty() {
            return Err(invalid("hub.url", &self.hub.url, "must not be empty"));
        }
        positive("hub.request_timeout_ms", self.hub.request_timeout_ms)?;
        positive("resolve.initial_ms", self.resolve.initial_ms)?;
        if self.resolve.max_ms < self.resolve.initial_ms {
            return Err(invalid(
                "resolve.max_ms",
                &self.resolve.max_ms.to_string(),
                "must be >= initial_ms",
            ));
        }
        if !(self.resolve.multiplier >= 1.0 && self.resolve.multiplier.is_finite()) {
            return Err(invalid(
                "resolve.multiplier",
                &self.resolve.multiplier.to_string(),
                "must be a finite number >= 1.0",
            ));
        }
        if self.resolve.max_attempts == 0 {
            return Err(invalid("resolve.max_attempts", "0", "must be > 0"));
        }
        positive("cycle.period_ms", self.cycle.period_ms)?;
        if self.cycle.partner_window == 0 {
            return Err(invalid("cycle.partner_window", "0", "must be > 0"));
        }
        positive("deadline.after_secs", self.deadline.after_secs)?;
        if self.planner.endpoint.trim().is_empty() {
            return Err(invalid("planner.endpoint", "", "must not be empty"));
        }
        if self.planner.model.trim().is_empty() {
            return Err(invalid("planner.model", "", "must not be empty"));
        }
        positive("planner.timeout_ms", self.planner.timeout_ms)?;
        positive("world.spawn_timeout_ms", self.world.spawn_timeout_ms)?;
        positive("world.command_timeout_ms", self.world.command_timeout_ms)?;
        if self.archive.mode == ArchiveMode::Git {
            if self.archive.remote.trim().is_empty() {
                return Err(invalid("archive.remote", "", "must not be empty"));
            }
            if self.archive.branch.trim().is_empty() {
                return Err(invalid("archive.branch", "", "must not be empty"));
            }
            positive("archive.command_timeout_ms", self.archive.command_timeout_ms)?;
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline.after_secs)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "0", "must be > 0"));
    }
    Ok(())
}
