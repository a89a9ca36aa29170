//! Hub Configuration Module
//!
//! Loaded from environment variables with defaults suitable for a single
//! local hub. Parse failures are reported, not silently replaced.

use cobuild_core::{BlockPos, ConfigError, PartitionConfig, DEFAULT_CHAT_CAPACITY, MAX_CHAT_CAPACITY};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Task handed to every pair unless overridden.
pub const DEFAULT_TASK: &str = "Work together as a pair to build a giant castle gate";

/// Prefix for generated tunnel subdomains.
pub const DEFAULT_SUBDOMAIN_PREFIX: &str = "mc-ai-project";

// ============================================================================
// EXPOSURE MODE
// ============================================================================

/// How the hub obtains a publicly reachable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposeMode {
    /// Local only.
    None,
    /// Operator already knows the public URL (reverse proxy, port forward).
    Static(String),
    /// Spawn the `lt` client.
    Localtunnel,
}

impl FromStr for ExposeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "none" | "off" => return Ok(ExposeMode::None),
            "localtunnel" | "lt" => return Ok(ExposeMode::Localtunnel),
            _ => {}
        }
        match trimmed.split_once(':') {
            Some((scheme, url)) if scheme.eq_ignore_ascii_case("static") && !url.trim().is_empty() => {
                Ok(ExposeMode::Static(url.trim().to_string()))
            }
            _ => Err(ConfigError::InvalidValue {
                field: "COBUILD_EXPOSE".to_string(),
                value: s.to_string(),
                reason: "expected none, localtunnel or static:<url>".to_string(),
            }),
        }
    }
}

// ============================================================================
// HUB CONFIGURATION
// ============================================================================

/// Runtime settings for the hub process.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    pub bind: String,
    pub port: u16,
    /// Chat ring size per pair.
    pub chat_capacity: usize,
    /// Task description returned by `GET /config/{pairId}`.
    pub task: String,
    /// Directory holding `progress_p{n}.json` checkpoints.
    pub data_dir: PathBuf,
    pub partition: PartitionConfig,
    pub expose: ExposeMode,
    pub expose_subdomain_prefix: String,
    /// Abort startup when exposure fails.
    pub expose_required: bool,
    pub log_json: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            chat_capacity: DEFAULT_CHAT_CAPACITY,
            task: DEFAULT_TASK.to_string(),
            data_dir: PathBuf::from("."),
            partition: PartitionConfig::default(),
            expose: ExposeMode::None,
            expose_subdomain_prefix: DEFAULT_SUBDOMAIN_PREFIX.to_string(),
            expose_required: false,
            log_json: false,
        }
    }
}

impl HubConfig {
    /// Create HubConfig from environment variables.
    ///
    /// Environment variables:
    /// - `COBUILD_HUB_BIND`: bind host (default: 0.0.0.0)
    /// - `PORT` / `COBUILD_HUB_PORT`: listen port (default: 8080)
    /// - `COBUILD_CHAT_CAPACITY`: chat ring size, 1..=100 (default: 10)
    /// - `COBUILD_TASK`: task description
    /// - `COBUILD_DATA_DIR`: checkpoint directory (default: .)
    /// - `COBUILD_REGION_ORIGIN`, `COBUILD_REGION_EXTENT`: `x,y,z` triples
    /// - `COBUILD_REGION_CELL`: spacing between pair regions along x
    /// - `COBUILD_EXPOSE`: none | localtunnel | static:<url>
    /// - `COBUILD_EXPOSE_SUBDOMAIN_PREFIX`, `COBUILD_EXPOSE_REQUIRED`
    /// - `COBUILD_LOG_JSON`: "true" for JSON log lines
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`HubConfig::from_env`] but reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let port = match lookup("PORT").or_else(|| lookup("COBUILD_HUB_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };
        let chat_capacity = match lookup("COBUILD_CHAT_CAPACITY") {
            Some(raw) => parse_value("COBUILD_CHAT_CAPACITY", &raw)?,
            None => defaults.chat_capacity,
        };
        let origin = match lookup("COBUILD_REGION_ORIGIN") {
            Some(raw) => parse_triple("COBUILD_REGION_ORIGIN", &raw)?,
            None => defaults.partition.origin,
        };
        let extent = match lookup("COBUILD_REGION_EXTENT") {
            Some(raw) => parse_triple("COBUILD_REGION_EXTENT", &raw)?,
            None => defaults.partition.extent,
        };
        let cell_size = match lookup("COBUILD_REGION_CELL") {
            Some(raw) => parse_value("COBUILD_REGION_CELL", &raw)?,
            None => defaults.partition.cell_size,
        };
        let expose = match lookup("COBUILD_EXPOSE") {
            Some(raw) => raw.parse()?,
            None => defaults.expose,
        };

        let config = Self {
            bind: lookup("COBUILD_HUB_BIND").unwrap_or(defaults.bind),
            port,
            chat_capacity,
            task: lookup("COBUILD_TASK")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.task),
            data_dir: lookup("COBUILD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            partition: PartitionConfig {
                origin,
                extent,
                cell_size,
            },
            expose,
            expose_subdomain_prefix: lookup("COBUILD_EXPOSE_SUBDOMAIN_PREFIX")
                .unwrap_or(defaults.expose_subdomain_prefix),
            expose_required: lookup("COBUILD_EXPOSE_REQUIRED")
                .map(|s| parse_flag(&s))
                .unwrap_or(defaults.expose_required),
            log_json: lookup("COBUILD_LOG_JSON")
                .map(|s| parse_flag(&s))
                .unwrap_or(defaults.log_json),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the hub's invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHAT_CAPACITY).contains(&self.chat_capacity) {
            return Err(ConfigError::InvalidValue {
                field: "chat_capacity".to_string(),
                value: self.chat_capacity.to_string(),
                reason: format!("must be between 1 and {}", MAX_CHAT_CAPACITY),
            });
        }
        self.partition.validate()?;
        self.bind_addr().map(|_| ())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "COBUILD_HUB_BIND".to_string(),
                value: addr.clone(),
                reason: e.to_string(),
            })
    }
}

fn parse_value<T>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_triple(field: &str, raw: &str) -> Result<BlockPos, ConfigError> {
    let parts = raw
        .split(',')
        .map(|part| parse_value::<i32>(field, part))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(BlockPos::new(*x, *y, *z)),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "expected three comma-separated integers".to_string(),
        }),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
