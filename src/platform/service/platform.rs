use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{SERVICE_LABEL, UNIT_NAME};
use crate::link::xml_escape;

fn home_dir() -> Result<PathBuf> {
    directories::UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")
}

pub(super) fn macos_service_file() -> Result<PathBuf> {
    Ok(home_dir()?
        .join("Library")
        .join("LaunchAgents")
        .join(format!("{SERVICE_LABEL}.plist")))
}

pub(super) fn linux_service_file() -> Result<PathBuf> {
    Ok(home_dir()?
        .join(".config")
        .join("systemd")
        .join("user")
        .join(UNIT_NAME))
}

/// launchd agent that runs `screenpop agent` at login and restarts it.
pub(super) fn render_plist(exe: &Path, log_dir: &Path) -> String {
    let stdout = log_dir.join("agent.stdout.log");
    let stderr = log_dir.join("agent.stderr.log");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
    <string>{exe}</string>
    <string>agent</string>
  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <true/>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
</dict>
</plist>
"#,
        label = SERVICE_LABEL,
        exe = xml_escape(&exe.display().to_string()),
        stdout = xml_escape(&stdout.display().to_string()),
        stderr = xml_escape(&stderr.display().to_string())
    )
}

pub(super) fn render_unit(exe: &Path) -> String {
    format!(
        "[Unit]\nDescription=Screen pop delivery agent\nAfter=network.target\n\n[Service]\nType=simple\nExecStart=\"{}\" agent\nRestart=always\nRestartSec=3\n\n[Install]\nWantedBy=default.target\n",
        exe.display()
    )
}
