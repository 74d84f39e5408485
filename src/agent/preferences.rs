use crate::mailbox::RecipientKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Locally persisted agent settings. Single writer: the local user via the
/// CLI or the agent itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_identity: Option<String>,
}

impl AgentPreferences {
    pub fn with_recipient(identity: impl Into<String>) -> Self {
        Self {
            recipient_identity: Some(identity.into()),
        }
    }

    pub fn recipient_key(&self) -> Option<RecipientKey> {
        self.recipient_identity
            .as_deref()
            .and_then(RecipientKey::from_identity)
    }

    /// A missing file is the default (no recipient).
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read preferences at {}", path.display()));
            }
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse preferences at {}", path.display()))
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .context("preferences path has no parent directory")?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Start a platform watcher on the directory holding `path`. Saves go
/// through a temp file and a rename, so the file itself cannot be watched.
fn start_watcher(path: &Path, events: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
    let dir = path
        .parent()
        .context("preferences path has no parent directory")?
        .to_path_buf();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let file_name = path.file_name().map(ToOwned::to_owned);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) && event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == file_name.as_deref());
                if relevant {
                    // A full queue already guarantees a reload.
                    let _ = events.try_send(());
                }
            }
            Err(e) => tracing::warn!(error = %e, "preferences watcher error"),
        },
        notify::Config::default(),
    )
    .context("failed to initialize preferences watcher")?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    Ok(watcher)
}

fn publish_if_changed(tx: &watch::Sender<AgentPreferences>, path: &Path) {
    match AgentPreferences::load(path) {
        Ok(preferences) => {
            tx.send_if_modified(|current| {
                if *current == preferences {
                    false
                } else {
                    tracing::info!(
                        recipient = ?preferences.recipient_identity,
                        "preferences changed on disk"
                    );
                    *current = preferences;
                    true
                }
            });
        }
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable preferences"),
    }
}

/// Watch the preferences file and publish every changed value. The initial
/// value is whatever is on disk now. Bursts of file events are coalesced
/// for `debounce` and the parsed contents, not timestamps, decide whether
/// anything changed.
pub fn watch_preferences(
    path: PathBuf,
    debounce: Duration,
    cancel: CancellationToken,
) -> (watch::Receiver<AgentPreferences>, JoinHandle<()>) {
    let initial = AgentPreferences::load(&path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable preferences");
        AgentPreferences::default()
    });
    let (tx, rx) = watch::channel(initial);

    let (event_tx, mut event_rx) = mpsc::channel::<()>(16);
    let watcher = match start_watcher(&path, event_tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::error!(
                error = %e,
                path = %path.display(),
                "on-disk preference edits will not be applied"
            );
            None
        }
    };

    let handle = tokio::spawn(async move {
        // Dropping the watcher stops event delivery.
        let _watcher = watcher;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = event_rx.recv() => {
                    if event.is_none() {
                        cancel.cancelled().await;
                        break;
                    }
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(debounce) => {}
            }
            while event_rx.try_recv().is_ok() {}

            publish_if_changed(&tx, &path);
        }
    });

    (rx, handle)
}
