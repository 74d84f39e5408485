use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Loopback host for both listeners (default: 127.0.0.1)
    #[serde(default = "default_agent_host")]
    pub host: String,
    /// Plaintext listener port (default: 8887, 0 = ephemeral)
    #[serde(default = "default_agent_port")]
    pub port: u16,
    /// TLS listener port (default: 8888, 0 = ephemeral)
    #[serde(default = "default_agent_tls_port")]
    pub tls_port: u16,
    /// Start the encrypted listener (default: true)
    #[serde(default = "default_true")]
    pub tls_enabled: bool,
    /// Quiet period before a burst of preference file events is applied
    #[serde(default = "default_preferences_debounce_ms")]
    pub preferences_debounce_ms: u64,
    #[serde(default = "default_reconnect_initial_backoff_secs")]
    pub reconnect_initial_backoff_secs: u64,
    #[serde(default = "default_reconnect_max_backoff_secs")]
    pub reconnect_max_backoff_secs: u64,
    /// Rotated activity log files kept on disk
    #[serde(default = "default_activity_log_files")]
    pub activity_log_files: usize,
}

fn default_agent_host() -> String {
    "127.0.0.1".into()
}

fn default_agent_port() -> u16 {
    8887
}

fn default_agent_tls_port() -> u16 {
    8888
}

fn default_true() -> bool {
    true
}

fn default_preferences_debounce_ms() -> u64 {
    200
}

fn default_reconnect_initial_backoff_secs() -> u64 {
    1
}

fn default_reconnect_max_backoff_secs() -> u64 {
    60
}

fn default_activity_log_files() -> usize {
    7
}

impl AgentConfig {
    /// Plaintext URL a producer on this machine reaches the agent at.
    pub fn loopback_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: default_agent_host(),
            port: default_agent_port(),
            tls_port: default_agent_tls_port(),
            tls_enabled: true,
            preferences_debounce_ms: default_preferences_debounce_ms(),
            reconnect_initial_backoff_secs: default_reconnect_initial_backoff_secs(),
            reconnect_max_backoff_secs: default_reconnect_max_backoff_secs(),
            activity_log_files: default_activity_log_files(),
        }
    }
}
