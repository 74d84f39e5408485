#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use screenpop::agent::{
    ActivityLog, AgentHandle, AgentOptions, AgentRuntime, Backoff, LaunchFuture, UriLauncher,
};
use screenpop::error::HandlerInvocationError;
use screenpop::mailbox::Mailbox;

/// Launcher that records every URI instead of asking the OS to open it.
#[derive(Default)]
pub struct RecordingLauncher {
    opened: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl RecordingLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            opened: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        })
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Poll until at least `count` URIs were opened or `timeout` elapsed.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let opened = self.opened();
            if opened.len() >= count || tokio::time::Instant::now() >= deadline {
                return opened;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl UriLauncher for RecordingLauncher {
    fn open<'a>(&'a self, uri: &'a str) -> LaunchFuture<'a> {
        Box::pin(async move {
            self.opened
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(uri.to_string());
            match &self.failure {
                Some(message) => Err(HandlerInvocationError::Rejected(message.clone())),
                None => Ok(()),
            }
        })
    }
}

pub fn options(dir: &Path, tls_enabled: bool) -> AgentOptions {
    AgentOptions {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls_port: 0,
        tls_enabled,
        tls_dir: dir.join("tls"),
        preferences_path: dir.join("preferences.json"),
        preferences_debounce: Duration::from_millis(20),
        backoff: Backoff::from_secs(1, 2),
    }
}

pub async fn start_agent(
    dir: &Path,
    launcher: Arc<RecordingLauncher>,
    mailbox: Option<Arc<dyn Mailbox>>,
    tls_enabled: bool,
) -> AgentHandle {
    let log = ActivityLog::open(&dir.join("logs"), 2).unwrap();
    AgentRuntime::new(options(dir, tls_enabled), launcher, mailbox, Arc::new(log))
        .start()
        .await
        .unwrap()
}

pub fn http_url(handle: &AgentHandle, path: &str) -> String {
    format!("http://{}{path}", handle.http_addr().unwrap())
}

/// Concatenated contents of every activity log file under `dir/logs`.
pub fn activity_log(dir: &Path) -> String {
    let mut contents = String::new();
    for entry in std::fs::read_dir(dir.join("logs")).unwrap() {
        let path = entry.unwrap().path();
        if path.is_file() {
            contents.push_str(&std::fs::read_to_string(path).unwrap());
        }
    }
    contents
}
