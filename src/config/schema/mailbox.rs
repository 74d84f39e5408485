use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// REST root of the cloud store, e.g. `https://<project>.firebaseio.com`
    #[serde(default)]
    pub database_url: Option<String>,
    /// Database secret or ID token, sent as the `auth` query parameter
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Top-level node holding one partition per recipient
    #[serde(default = "default_mailbox_root")]
    pub root: String,
    /// Relay endpoint for producers without store credentials
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_mailbox_root() -> String {
    "mailbox".into()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            auth_token: None,
            root: default_mailbox_root(),
            relay_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
