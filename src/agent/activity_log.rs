use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Append-only, daily-rotated record of everything the agent did. Each line
/// is also emitted as a `tracing` event under target `activity`.
pub struct ActivityLog {
    file: Option<Mutex<RollingFileAppender>>,
}

impl ActivityLog {
    pub fn open(dir: &Path, max_files: usize) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("activity")
            .filename_suffix("log")
            .max_log_files(max_files.max(1))
            .build(dir)?;
        Ok(Self {
            file: Some(Mutex::new(appender)),
        })
    }

    /// Mirror to `tracing` only.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn record(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "activity", "{message}");

        let Some(file) = &self.file else {
            return;
        };
        let line = format_line(chrono::Utc::now(), message);
        let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|()| file.flush()) {
            tracing::warn!(error = %e, "failed to write activity log");
        }
    }
}

fn format_line(at: chrono::DateTime<chrono::Utc>, message: &str) -> String {
    format!(
        "[{}] {message}\n",
        at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    )
}
