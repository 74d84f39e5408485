use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_host")]
    pub host: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
}

fn default_relay_host() -> String {
    "127.0.0.1".into()
}

fn default_relay_port() -> u16 {
    3000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_relay_host(),
            port: default_relay_port(),
        }
    }
}
