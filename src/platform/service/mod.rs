//! Login auto-start registration for the agent (launchd on macOS, a systemd
//! user unit on Linux).

mod commands;
mod platform;
mod utils;

pub use commands::{AutostartState, handle_command, status};

pub(super) const SERVICE_LABEL: &str = "com.screenpop.agent";
pub(super) const UNIT_NAME: &str = "screenpop-agent.service";
