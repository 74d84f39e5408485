//! Local delivery agent: loopback listeners (plaintext and TLS), the mailbox
//! subscription and the runtime context that owns them.

pub mod activity_log;
mod handlers;
pub mod launcher;
pub mod preferences;
mod server;
pub mod subscriber;
pub mod tls;

pub use activity_log::ActivityLog;
pub use handlers::{LoopbackState, parse_uri};
pub use launcher::{LaunchFuture, SystemLauncher, UriLauncher};
pub use preferences::{AgentPreferences, watch_preferences};
pub use server::{MAX_BODY_SIZE, REQUEST_TIMEOUT_SECS, loopback_router};
pub use subscriber::{Backoff, JobOutcome, JobProcessor, SubscriptionManager};

use crate::config::Config;
use crate::error::SubscriptionError;
use crate::mailbox::{Mailbox, RecipientKey};
use anyhow::{Result, bail};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything the agent needs to know about where to listen and what to own.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub host: String,
    pub port: u16,
    pub tls_port: u16,
    pub tls_enabled: bool,
    pub tls_dir: PathBuf,
    pub preferences_path: PathBuf,
    pub preferences_debounce: Duration,
    pub backoff: Backoff,
}

impl AgentOptions {
    pub fn from_config(config: &Config) -> Self {
        let paths = config.paths();
        Self {
            host: config.agent.host.clone(),
            port: config.agent.port,
            tls_port: config.agent.tls_port,
            tls_enabled: config.agent.tls_enabled,
            tls_dir: paths.tls_dir,
            preferences_path: paths.preferences,
            preferences_debounce: Duration::from_millis(config.agent.preferences_debounce_ms),
            backoff: Backoff::from_secs(
                config.agent.reconnect_initial_backoff_secs,
                config.agent.reconnect_max_backoff_secs,
            ),
        }
    }
}

type ReconfigureAck = oneshot::Sender<Result<RecipientKey, SubscriptionError>>;

/// Process-root context object. Built once, consumed by [`AgentRuntime::start`].
pub struct AgentRuntime {
    options: AgentOptions,
    launcher: Arc<dyn UriLauncher>,
    mailbox: Option<Arc<dyn Mailbox>>,
    log: Arc<ActivityLog>,
}

/// A running agent. Dropping it does not stop anything; call
/// [`AgentHandle::shutdown`].
pub struct AgentHandle {
    http_addr: Option<SocketAddr>,
    https_addr: Option<SocketAddr>,
    preferences_path: PathBuf,
    cancel: CancellationToken,
    listeners: Vec<JoinHandle<()>>,
    watcher: JoinHandle<()>,
    control: JoinHandle<()>,
    reconfigure: mpsc::Sender<(AgentPreferences, ReconfigureAck)>,
    log: Arc<ActivityLog>,
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    Ok(TcpListener::bind(addr).await?)
}

impl AgentRuntime {
    pub fn new(
        options: AgentOptions,
        launcher: Arc<dyn UriLauncher>,
        mailbox: Option<Arc<dyn Mailbox>>,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            options,
            launcher,
            mailbox,
            log,
        }
    }

    /// Bind the listeners and start the subscription. Only fails when no
    /// listener could be started.
    pub async fn start(self) -> Result<AgentHandle> {
        let Self {
            options,
            launcher,
            mailbox,
            log,
        } = self;
        log.record("=== Screen Pop Agent Started ===");

        let cancel = CancellationToken::new();
        let router = loopback_router(LoopbackState {
            launcher: Arc::clone(&launcher),
            log: Arc::clone(&log),
        });
        let mut listeners = Vec::new();

        let http_addr = match bind(&options.host, options.port).await {
            Ok(listener) => {
                let addr = listener.local_addr()?;
                log.record(format!("HTTP server listening on http://{addr}"));
                listeners.push(tokio::spawn(server::serve_plaintext(
                    listener,
                    router.clone(),
                    cancel.clone(),
                )));
                Some(addr)
            }
            Err(e) => {
                log.record(format!(
                    "Error: HTTP server could not bind {}:{}: {e}",
                    options.host, options.port
                ));
                None
            }
        };

        let https_addr = if options.tls_enabled {
            start_tls(&options, router, &cancel, &log, &mut listeners).await
        } else {
            None
        };

        if http_addr.is_none() && https_addr.is_none() {
            cancel.cancel();
            bail!(
                "no loopback listener could be started on {}:{} or {}:{}",
                options.host,
                options.port,
                options.host,
                options.tls_port
            );
        }

        let (preferences, watcher) = watch_preferences(
            options.preferences_path.clone(),
            options.preferences_debounce,
            cancel.child_token(),
        );
        let manager = SubscriptionManager::new(
            mailbox,
            launcher,
            Arc::clone(&log),
            options.backoff,
            cancel.clone(),
        );
        let (reconfigure, requests) = mpsc::channel(8);
        let control = tokio::spawn(run_control(
            manager,
            preferences,
            requests,
            cancel.clone(),
        ));

        Ok(AgentHandle {
            http_addr,
            https_addr,
            preferences_path: options.preferences_path,
            cancel,
            listeners,
            watcher,
            control,
            reconfigure,
            log,
        })
    }
}

async fn start_tls(
    options: &AgentOptions,
    router: axum::Router,
    cancel: &CancellationToken,
    log: &ActivityLog,
    listeners: &mut Vec<JoinHandle<()>>,
) -> Option<SocketAddr> {
    let identity = match tls::load_or_provision(&options.tls_dir).await {
        Ok(identity) => identity,
        Err(e) => {
            log.record(format!("Error: HTTPS disabled, certificate unavailable: {e}"));
            return None;
        }
    };
    let config = match tls::server_config(&identity) {
        Ok(config) => config,
        Err(e) => {
            log.record(format!("Error: HTTPS disabled: {e}"));
            return None;
        }
    };
    let listener = match bind(&options.host, options.tls_port).await {
        Ok(listener) => listener,
        Err(e) => {
            log.record(format!(
                "Error: HTTPS server could not bind {}:{}: {e}",
                options.host, options.tls_port
            ));
            return None;
        }
    };

    let addr = listener.local_addr().ok()?;
    log.record(format!("HTTPS server listening on https://{addr}"));
    listeners.push(tokio::spawn(server::serve_tls(
        listener,
        config,
        router,
        cancel.clone(),
    )));
    Some(addr)
}

/// Serializes every subscription change: preference file edits and explicit
/// reconfiguration requests go through the same manager.
async fn run_control(
    mut manager: SubscriptionManager,
    mut preferences: watch::Receiver<AgentPreferences>,
    mut requests: mpsc::Receiver<(AgentPreferences, ReconfigureAck)>,
    cancel: CancellationToken,
) {
    let initial = preferences.borrow_and_update().clone();
    if let Err(e) = manager.apply(&initial).await {
        tracing::warn!(error = %e, "agent started without a mailbox subscription");
    }

    let mut watching = true;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = preferences.changed(), if watching => {
                if changed.is_err() {
                    // Watcher gone; explicit reconfiguration still works.
                    watching = false;
                    continue;
                }
                let next = preferences.borrow_and_update().clone();
                if let Err(e) = manager.apply(&next).await {
                    tracing::warn!(error = %e, "resubscription skipped");
                }
            }
            Some((next, ack)) = requests.recv() => {
                let result = manager.apply(&next).await;
                let _ = ack.send(result);
            }
        }
    }

    manager.stop().await;
}

impl AgentHandle {
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https_addr
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Persist new preferences and resubscribe accordingly.
    pub async fn reconfigure(
        &self,
        preferences: AgentPreferences,
    ) -> Result<std::result::Result<RecipientKey, SubscriptionError>> {
        preferences.save(&self.preferences_path)?;
        let (ack, result) = oneshot::channel();
        self.reconfigure
            .send((preferences, ack))
            .await
            .map_err(|_| anyhow::anyhow!("agent is shutting down"))?;
        Ok(result.await?)
    }

    /// Stop the subscription (draining in-flight jobs), then both listeners.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.control.await {
            tracing::error!(error = %e, "agent control task failed");
        }
        if let Err(e) = self.watcher.await {
            tracing::error!(error = %e, "preferences watcher failed");
        }
        for listener in self.listeners {
            if let Err(e) = listener.await {
                tracing::error!(error = %e, "listener task failed");
            }
        }
        self.log.record("Server stopped");
    }
}
