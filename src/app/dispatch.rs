use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use screenpop::agent::{
    ActivityLog, AgentOptions, AgentPreferences, AgentRuntime, SystemLauncher,
};
use screenpop::dispatch::{DispatchPolicy, Dispatcher, LoopbackClient};
use screenpop::link::{self, LinkBuilder};
use screenpop::observer::{CallEvent, read_call_events};
use screenpop::pipeline::spawn_pipeline;
use screenpop::{Config, IdentityCommands, LinkKind, mailbox};

use crate::app::status::render_status;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "SIGTERM handler unavailable"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
    }
}

async fn run_agent(config: Config) -> Result<()> {
    let options = AgentOptions::from_config(&config);
    let log = match ActivityLog::open(&config.paths().log_dir, config.agent.activity_log_files) {
        Ok(log) => log,
        Err(e) => {
            tracing::warn!(error = %e, "activity log unavailable; logging to console only");
            ActivityLog::disabled()
        }
    };

    let mailbox = match mailbox::from_config(&config.mailbox) {
        Ok(mailbox) => Some(mailbox),
        Err(e) => {
            tracing::warn!(error = %e, "mailbox unavailable; only direct delivery will work");
            None
        }
    };

    let runtime = AgentRuntime::new(options, Arc::new(SystemLauncher), mailbox, Arc::new(log));
    let handle = runtime.start().await?;

    if let Some(addr) = handle.http_addr() {
        println!("◆ Agent listening on http://{addr}");
    }
    if let Some(addr) = handle.https_addr() {
        println!("◆ Agent listening on https://{addr}");
    }
    println!("  Press Ctrl+C to stop");

    shutdown_signal().await;
    handle.shutdown().await;
    Ok(())
}

async fn run_relay(config: Config) -> Result<()> {
    let writer = mailbox::RestMailbox::from_config(&config.mailbox)
        .context("the relay needs [mailbox] database_url")?;
    let shutdown = CancellationToken::new();
    let host = config.relay.host.clone();
    let port = config.relay.port;
    let server_shutdown = shutdown.clone();
    let mut server = tokio::spawn(async move {
        screenpop::relay::run_relay(&host, port, Arc::new(writer), server_shutdown).await
    });

    tokio::select! {
        result = &mut server => return result?,
        () = shutdown_signal() => {}
    }
    shutdown.cancel();
    server.await?
}

/// Producer recipient: explicit flag, then config, then the local agent's
/// preferences.
fn producer_recipient(config: &Config, flag: Option<String>) -> Option<String> {
    flag.or_else(|| config.dispatch.recipient_identity.clone())
        .or_else(|| {
            AgentPreferences::load(&config.paths().preferences)
                .ok()
                .and_then(|prefs| prefs.recipient_identity)
        })
}

fn build_dispatcher(config: &Config, recipient: Option<String>) -> Result<Dispatcher> {
    let mut policy = DispatchPolicy::from_config(&config.dispatch);
    policy.recipient = recipient;

    let writer = match mailbox::writer_from_config(&config.mailbox) {
        Ok(writer) => Some(writer),
        Err(e) => {
            tracing::warn!(error = %e, "no mailbox writer; durable delivery disabled");
            None
        }
    };
    let loopback = LoopbackClient::new(
        config.dispatch.agent_url.clone(),
        config.dispatch.direct_timeout_secs,
    )
    .context("failed to set up the direct delivery client")?;
    Ok(Dispatcher::new(policy, loopback, writer))
}

async fn run_observe(config: Config, recipient: Option<String>) -> Result<()> {
    let recipient = producer_recipient(&config, recipient);
    let pipeline = spawn_pipeline(build_dispatcher(&config, recipient)?);

    let stdin = BufReader::new(tokio::io::stdin());
    let forwarded = read_call_events(stdin, pipeline.sender()).await?;
    pipeline.finish().await;

    tracing::info!(events = forwarded, "call event input closed");
    Ok(())
}

async fn run_pop(config: Config, number: String, recipient: Option<String>) -> Result<()> {
    let recipient = producer_recipient(&config, recipient);
    if !config.dispatch.enabled {
        println!("Screen pop is disabled; set [dispatch] enabled = true in config.toml");
    }
    let pipeline = spawn_pipeline(build_dispatcher(&config, recipient)?);

    pipeline
        .sender()
        .send(CallEvent::inbound_connected(number))
        .await
        .context("pipeline stopped before the event was accepted")?;
    pipeline.finish().await;
    Ok(())
}

fn print_link(
    config: &Config,
    number: Option<String>,
    kind: LinkKind,
    customer: Option<String>,
    routing_id: Option<String>,
    instance: Option<String>,
) -> Result<()> {
    let builder = LinkBuilder::new(
        routing_id.unwrap_or_else(|| config.dispatch.routing_id.clone()),
        instance.unwrap_or_else(|| config.dispatch.instance.clone()),
    );

    let uri = match (customer, number) {
        (Some(customer), _) => builder.customer_display(&customer),
        (None, Some(number)) => {
            let normalized = link::normalize(&number);
            match kind {
                LinkKind::StartCall => builder.start_call(&normalized),
                LinkKind::CustomerSearch => builder.customer_search(&normalized),
            }
        }
        (None, None) => anyhow::bail!("a phone number or --customer is required"),
    };

    println!("{uri}");
    Ok(())
}

fn identity(config: &Config, command: &IdentityCommands) -> Result<()> {
    let path = config.paths().preferences;
    match command {
        IdentityCommands::Show => {
            let prefs = AgentPreferences::load(&path)?;
            match (prefs.recipient_identity.as_deref(), prefs.recipient_key()) {
                (Some(identity), Some(key)) => {
                    println!("Identity:    {identity}");
                    println!("Mailbox key: {}/{key}", config.mailbox.root);
                }
                _ => println!("No recipient identity configured"),
            }
        }
        IdentityCommands::Set { identity } => {
            let prefs = AgentPreferences::with_recipient(identity.trim());
            let key = prefs
                .recipient_key()
                .context("identity must not be blank")?;
            prefs.save(&path)?;
            println!("✅ Identity set; agent will subscribe to {}/{key}", config.mailbox.root);
        }
        IdentityCommands::Clear => {
            AgentPreferences::default().save(&path)?;
            println!("✅ Identity cleared");
        }
    }
    Ok(())
}

pub async fn dispatch(cli: Cli, mut config: Config) -> Result<()> {
    match cli.command {
        Commands::Agent {
            host,
            port,
            tls_port,
            no_tls,
        } => {
            if let Some(host) = host {
                config.agent.host = host;
            }
            if let Some(port) = port {
                config.agent.port = port;
            }
            if let Some(tls_port) = tls_port {
                config.agent.tls_port = tls_port;
            }
            if no_tls {
                config.agent.tls_enabled = false;
            }
            config.validate()?;
            run_agent(config).await
        }

        Commands::Relay { host, port } => {
            if let Some(host) = host {
                config.relay.host = host;
            }
            if let Some(port) = port {
                config.relay.port = port;
            }
            run_relay(config).await
        }

        Commands::Observe { recipient } => run_observe(config, recipient).await,

        Commands::Pop { number, recipient } => run_pop(config, number, recipient).await,

        Commands::Link {
            number,
            kind,
            customer,
            routing_id,
            instance,
        } => print_link(&config, number, kind, customer, routing_id, instance),

        Commands::Identity { identity_command } => identity(&config, &identity_command),

        Commands::Autostart { autostart_command } => {
            screenpop::platform::service::handle_command(&autostart_command, &config)
        }

        Commands::Status => {
            println!("{}", render_status(&config));
            Ok(())
        }
    }
}
