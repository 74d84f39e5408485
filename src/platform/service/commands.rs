use crate::commands::AutostartCommands;
use crate::config::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use super::platform::{linux_service_file, macos_service_file, render_plist, render_unit};
use super::utils::{run_capture, run_checked};
use super::{SERVICE_LABEL, UNIT_NAME};

const UNSUPPORTED: &str = "Auto-start is supported on macOS and Linux only";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutostartState {
    pub registered: bool,
    pub detail: String,
    pub file: PathBuf,
}

pub fn handle_command(command: &AutostartCommands, config: &Config) -> Result<()> {
    match command {
        AutostartCommands::Enable => enable(config),
        AutostartCommands::Disable => disable(),
        AutostartCommands::Status => {
            let state = status()?;
            println!(
                "Auto-start: {}",
                if state.registered {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!("State:      {}", state.detail.trim());
            println!("Unit:       {}", state.file.display());
            Ok(())
        }
    }
}

fn service_file() -> Result<PathBuf> {
    if cfg!(target_os = "macos") {
        macos_service_file()
    } else if cfg!(target_os = "linux") {
        linux_service_file()
    } else {
        anyhow::bail!(UNSUPPORTED)
    }
}

/// Rewrites the same file every time, so enabling twice is harmless.
fn enable(config: &Config) -> Result<()> {
    let file = service_file()?;
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    let exe = std::env::current_exe().context("Failed to resolve current executable")?;

    if cfg!(target_os = "macos") {
        let log_dir = config.paths().log_dir;
        fs::create_dir_all(&log_dir)?;
        fs::write(&file, render_plist(&exe, &log_dir))
            .with_context(|| format!("Failed to write {}", file.display()))?;
        // Unload first so a rewritten plist is picked up.
        let _ = run_checked(Command::new("launchctl").arg("unload").arg(&file));
        run_checked(Command::new("launchctl").arg("load").arg("-w").arg(&file))?;
    } else {
        fs::write(&file, render_unit(&exe))
            .with_context(|| format!("Failed to write {}", file.display()))?;
        let _ = run_checked(Command::new("systemctl").args(["--user", "daemon-reload"]));
        run_checked(Command::new("systemctl").args(["--user", "enable", UNIT_NAME]))?;
    }

    tracing::info!(file = %file.display(), "auto-start enabled");
    println!("✅ Auto-start enabled ({})", file.display());
    Ok(())
}

fn disable() -> Result<()> {
    let file = service_file()?;
    if !file.exists() {
        println!("Auto-start already disabled");
        return Ok(());
    }

    if cfg!(target_os = "macos") {
        let _ = run_checked(Command::new("launchctl").arg("unload").arg("-w").arg(&file));
    } else {
        let _ = run_checked(Command::new("systemctl").args(["--user", "disable", UNIT_NAME]));
    }
    fs::remove_file(&file).with_context(|| format!("Failed to remove {}", file.display()))?;
    if cfg!(target_os = "linux") {
        let _ = run_checked(Command::new("systemctl").args(["--user", "daemon-reload"]));
    }

    tracing::info!(file = %file.display(), "auto-start disabled");
    println!("✅ Auto-start disabled ({})", file.display());
    Ok(())
}

pub fn status() -> Result<AutostartState> {
    let file = service_file()?;
    let registered = file.exists();

    let detail = if cfg!(target_os = "macos") {
        let out = run_capture(Command::new("launchctl").arg("list")).unwrap_or_default();
        if out.lines().any(|line| line.contains(SERVICE_LABEL)) {
            "loaded".to_string()
        } else {
            "not loaded".to_string()
        }
    } else {
        run_capture(Command::new("systemctl").args(["--user", "is-enabled", UNIT_NAME]))
            .unwrap_or_else(|_| "unknown".into())
    };

    Ok(AutostartState {
        registered,
        detail,
        file,
    })
}
