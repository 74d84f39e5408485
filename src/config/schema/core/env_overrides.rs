use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(super) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SCREENPOP_DATABASE_URL")
            && !url.is_empty()
        {
            self.mailbox.database_url = Some(url);
        }

        if let Some(token) = lookup("SCREENPOP_AUTH_TOKEN")
            && !token.is_empty()
        {
            self.mailbox.auth_token = Some(token);
        }

        if let Some(url) = lookup("SCREENPOP_RELAY_URL")
            && !url.is_empty()
        {
            self.mailbox.relay_url = Some(url);
        }

        if let Some(port_str) = lookup("SCREENPOP_AGENT_PORT")
            && let Ok(port) = port_str.parse::<u16>()
        {
            // The producer follows the agent unless its URL was pointed elsewhere.
            let follows_agent =
                self.dispatch.agent_url.trim_end_matches('/') == self.agent.loopback_url();
            self.agent.port = port;
            if follows_agent && port != 0 {
                self.dispatch.agent_url = self.agent.loopback_url();
            }
        }

        if let Some(recipient) = lookup("SCREENPOP_RECIPIENT")
            && !recipient.trim().is_empty()
        {
            self.dispatch.recipient_identity = Some(recipient.trim().to_string());
        }
    }
}
