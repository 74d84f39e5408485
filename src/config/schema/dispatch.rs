use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Accepted range for `min_length`.
pub const MIN_LENGTH_RANGE: RangeInclusive<usize> = 1..=20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Master switch for screen pops (default: false)
    #[serde(default)]
    pub enabled: bool,
    /// Minimum normalized phone number length (default: 10, range 1-20)
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    /// Institution routing id embedded in the deep link
    #[serde(default)]
    pub routing_id: String,
    /// Target instance name embedded in the deep link
    #[serde(default)]
    pub instance: String,
    /// Identity whose mailbox partition receives durable jobs
    #[serde(default)]
    pub recipient_identity: Option<String>,
    /// Loopback endpoint of the local agent
    #[serde(default = "default_agent_url")]
    pub agent_url: String,
    #[serde(default = "default_direct_timeout_secs")]
    pub direct_timeout_secs: u64,
}

fn default_min_length() -> usize {
    10
}

fn default_agent_url() -> String {
    "http://127.0.0.1:8887".into()
}

fn default_direct_timeout_secs() -> u64 {
    5
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_length: default_min_length(),
            routing_id: String::new(),
            instance: String::new(),
            recipient_identity: None,
            agent_url: default_agent_url(),
            direct_timeout_secs: default_direct_timeout_secs(),
        }
    }
}
