use super::super::{AgentConfig, DispatchConfig, MailboxConfig, ObservabilityConfig, RelayConfig};
use anyhow::Result;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config, preferences, TLS identity and logs - computed, not serialized
    #[serde(skip)]
    pub state_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub mailbox: MailboxConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = default_state_dir();
        Self {
            config_path: state_dir.join("config.toml"),
            state_dir,
            agent: AgentConfig::default(),
            dispatch: DispatchConfig::default(),
            mailbox: MailboxConfig::default(),
            relay: RelayConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

pub(super) fn default_state_dir() -> PathBuf {
    UserDirs::new()
        .map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf())
        .join(".screenpop")
}

/// Files the agent owns under the state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub preferences: PathBuf,
    pub tls_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl StatePaths {
    pub fn under(state_dir: &Path) -> Self {
        Self {
            preferences: state_dir.join("preferences.json"),
            tls_dir: state_dir.join("tls"),
            log_dir: state_dir.join("logs"),
        }
    }
}

impl Config {
    pub fn paths(&self) -> StatePaths {
        StatePaths::under(&self.state_dir)
    }

    /// Config rooted in an arbitrary directory (tests, portable installs).
    pub fn in_dir(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            config_path: state_dir.join("config.toml"),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_dispatch()?;
        self.validate_agent_ports()?;
        self.validate_urls()?;
        Ok(())
    }

    fn validate_dispatch(&self) -> Result<()> {
        let min_length = self.dispatch.min_length;
        if !super::super::MIN_LENGTH_RANGE.contains(&min_length) {
            return Err(crate::error::ConfigError::Validation(format!(
                "dispatch.min_length must be between {} and {} (got {min_length})",
                super::super::MIN_LENGTH_RANGE.start(),
                super::super::MIN_LENGTH_RANGE.end()
            ))
            .into());
        }
        Ok(())
    }

    fn validate_agent_ports(&self) -> Result<()> {
        let agent = &self.agent;
        if agent.tls_enabled && agent.port != 0 && agent.port == agent.tls_port {
            return Err(crate::error::ConfigError::Validation(format!(
                "agent.port and agent.tls_port must differ (both {})",
                agent.port
            ))
            .into());
        }
        Ok(())
    }

    fn validate_urls(&self) -> Result<()> {
        validate_http_url("dispatch.agent_url", Some(&self.dispatch.agent_url))?;
        validate_http_url("mailbox.database_url", self.mailbox.database_url.as_deref())?;
        validate_http_url("mailbox.relay_url", self.mailbox.relay_url.as_deref())?;
        Ok(())
    }
}

fn validate_http_url(field: &str, value: Option<&str>) -> Result<()> {
    let Some(raw) = value else {
        return Ok(());
    };
    let parsed = url::Url::parse(raw).map_err(|e| {
        crate::error::ConfigError::Validation(format!("{field} is not a valid URL ({raw}): {e}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(crate::error::ConfigError::Validation(format!(
            "{field} must use http or https (got {})",
            parsed.scheme()
        ))
        .into());
    }
    Ok(())
}
