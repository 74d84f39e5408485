use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Auto-start registration subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AutostartCommands {
    /// Register the agent to start at login (idempotent)
    Enable,
    /// Remove the login registration (no-op when absent)
    Disable,
    /// Show whether the agent is registered and loaded
    Status,
}

/// Recipient identity subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum IdentityCommands {
    /// Print the identity the agent subscribes with
    Show,
    /// Set the identity; a running agent resubscribes
    Set {
        /// User identity, e.g. an email address
        identity: String,
    },
    /// Forget the identity; a running agent unsubscribes
    Clear,
}

/// Deep link flavours for `screenpop link`
#[derive(ValueEnum, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LinkKind {
    /// Open the start-call screen for the caller
    #[default]
    StartCall,
    /// Search customers by phone number
    CustomerSearch,
}
