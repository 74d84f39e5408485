use screenpop::Config;
use screenpop::agent::AgentPreferences;
use screenpop::agent::tls::TlsPaths;

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn render_status(config: &Config) -> String {
    let paths = config.paths();
    let mut lines = vec![
        "◆ screenpop status".to_string(),
        String::new(),
        format!("Version:     {}", env!("CARGO_PKG_VERSION")),
        format!("Config:      {}", config.config_path.display()),
        format!("State dir:   {}", config.state_dir.display()),
        String::new(),
        format!(
            "Agent:       http://{}:{}",
            config.agent.host, config.agent.port
        ),
    ];

    if config.agent.tls_enabled {
        lines.push(format!(
            "             https://{}:{}",
            config.agent.host, config.agent.tls_port
        ));
    }
    let tls = TlsPaths::in_dir(&paths.tls_dir);
    lines.push(format!("TLS identity: {}", yes_no(tls.exist())));

    lines.push(String::new());
    let unset_or = |value: &str| -> String {
        if value.is_empty() {
            "(unset)".to_string()
        } else {
            value.to_string()
        }
    };
    lines.push(format!(
        "Dispatch:    {}",
        if config.dispatch.enabled {
            "enabled"
        } else {
            "disabled"
        }
    ));
    lines.push(format!("  min length {}", config.dispatch.min_length));
    lines.push(format!(
        "  routing id {}",
        unset_or(&config.dispatch.routing_id)
    ));
    lines.push(format!("  instance   {}", unset_or(&config.dispatch.instance)));
    lines.push(format!("  agent url  {}", config.dispatch.agent_url));

    lines.push(String::new());
    // Never print the credential; only whether it is present.
    lines.push(format!(
        "Mailbox:     {}",
        config.mailbox.database_url.as_deref().unwrap_or("(not configured)")
    ));
    lines.push(format!(
        "  auth token {}",
        yes_no(config.mailbox.auth_token.is_some())
    ));
    if let Some(relay) = &config.mailbox.relay_url {
        lines.push(format!("  via relay  {relay}"));
    }

    let identity = match AgentPreferences::load(&paths.preferences) {
        Ok(prefs) => prefs
            .recipient_identity
            .unwrap_or_else(|| "(not set)".to_string()),
        Err(e) => format!("(unreadable: {e})"),
    };
    lines.push(format!("Identity:    {identity}"));

    let autostart = match screenpop::platform::service::status() {
        Ok(state) if state.registered => "enabled".to_string(),
        Ok(_) => "disabled".to_string(),
        Err(e) => e.to_string(),
    };
    lines.push(format!("Auto-start:  {autostart}"));

    lines.join("\n")
}
