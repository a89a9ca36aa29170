//! Public exposure of the locally bound hub.
//!
//! The hub must already be serving when an [`Exposer`] is asked for a URL,
//! otherwise the announced address would answer with errors.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::config::{ExposeMode, HubConfig};

static ANNOUNCED_URL: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)your url is:\s*(https?://\S+)"));

/// Exposure failures. Logged loudly at startup.
#[derive(Debug, Error)]
pub enum ExposeError {
    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited before announcing a URL")]
    Exited { program: String },

    #[error("No public URL announced within {0:?}")]
    Timeout(Duration),

    #[error("Exposer output unreadable: {0}")]
    Io(String),
}

/// A public URL plus whatever must stay alive for it to keep working.
#[derive(Debug)]
pub struct Exposure {
    pub url: String,
    /// Tunnel client process; dropping the exposure kills it.
    tunnel: Option<Child>,
}

impl Exposure {
    pub fn is_tunnelled(&self) -> bool {
        self.tunnel.is_some()
    }
}

/// Capability that makes a local port reachable from elsewhere.
#[async_trait]
pub trait Exposer: Send + Sync {
    async fn expose(&self, port: u16, subdomain_hint: &str) -> Result<Exposure, ExposeError>;
}

/// Subdomain hint in the form `{prefix}-{0..9999}`.
pub fn subdomain_hint(prefix: &str) -> String {
    let suffix: u32 = rand::rng().random_range(0..9999);
    format!("{}-{}", prefix, suffix)
}

/// Pick the exposer configured for this hub, if any.
pub fn exposer_for(config: &HubConfig) -> Option<Box<dyn Exposer>> {
    match &config.expose {
        ExposeMode::None => None,
        ExposeMode::Static(url) => Some(Box::new(StaticExposer::new(url.clone()))),
        ExposeMode::Localtunnel => Some(Box::new(LocaltunnelExposer::default())),
    }
}

// ============================================================================
// STATIC
// ============================================================================

/// URL supplied by the operator.
#[derive(Debug, Clone)]
pub struct StaticExposer {
    url: String,
}

impl StaticExposer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Exposer for StaticExposer {
    async fn expose(&self, _port: u16, _subdomain_hint: &str) -> Result<Exposure, ExposeError> {
        Ok(Exposure {
            url: self.url.clone(),
            tunnel: None,
        })
    }
}

// ============================================================================
// LOCALTUNNEL
// ============================================================================

/// Runs the localtunnel CLI (`lt --port P --subdomain S`) and waits for it
/// to print its public URL.
#[derive(Debug, Clone)]
pub struct LocaltunnelExposer {
    program: String,
    announce_timeout: Duration,
}

impl Default for LocaltunnelExposer {
    fn default() -> Self {
        Self {
            program: "lt".to_string(),
            announce_timeout: Duration::from_secs(30),
        }
    }
}

impl LocaltunnelExposer {
    pub fn with_program(program: impl Into<String>, announce_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            announce_timeout,
        }
    }

    async fn read_announcement(&self, child: &mut Child) -> Result<String, ExposeError> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExposeError::Io("stdout not captured".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ExposeError::Io(e.to_string()))?
        {
            tracing::debug!(line = %line, "localtunnel output");
            if let Some(url) = parse_announced_url(&line) {
                return Ok(url);
            }
        }
        Err(ExposeError::Exited {
            program: self.program.clone(),
        })
    }
}

#[async_trait]
impl Exposer for LocaltunnelExposer {
    async fn expose(&self, port: u16, subdomain_hint: &str) -> Result<Exposure, ExposeError> {
        let mut child = Command::new(&self.program)
            .arg("--port")
            .arg(port.to_string())
            .arg("--subdomain")
            .arg(subdomain_hint)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExposeError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let url = tokio::time::timeout(self.announce_timeout, self.read_announcement(&mut child))
            .await
            .map_err(|_| ExposeError::Timeout(self.announce_timeout))??;

        Ok(Exposure {
            url,
            tunnel: Some(child),
        })
    }
}

/// Extract the URL from a line like `your url is: https://x.loca.lt`.
pub fn parse_announced_url(line: &str) -> Option<String> {
    let pattern = ANNOUNCED_URL.as_ref().ok()?;
    pattern
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
