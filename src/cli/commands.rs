use clap::{Parser, Subcommand};
use screenpop::{AutostartCommands, IdentityCommands, LinkKind};

/// `screenpop` - call-driven screen pops delivered to the local desktop.
#[derive(Parser, Debug)]
#[command(name = "screenpop")]
#[command(version)]
#[command(about = "Screen pop delivery: call observer, mailbox relay and local agent.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the local delivery agent (loopback listeners + mailbox subscription)
    Agent {
        /// Host to bind both listeners to
        #[arg(long)]
        host: Option<String>,

        /// Plaintext listener port (0 for a random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// TLS listener port (0 for a random available port)
        #[arg(long)]
        tls_port: Option<u16>,

        /// Do not start the TLS listener
        #[arg(long)]
        no_tls: bool,
    },

    /// Run the mailbox relay service (POST /api/data)
    Relay {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Read JSON-lines call events from stdin and dispatch screen pops
    Observe {
        /// Recipient identity for mailbox delivery (overrides config)
        #[arg(long)]
        recipient: Option<String>,
    },

    /// Dispatch one screen pop as if an inbound call connected
    Pop {
        /// Caller phone number
        number: String,

        /// Recipient identity for mailbox delivery (overrides config)
        #[arg(long)]
        recipient: Option<String>,
    },

    /// Print a deep link without dispatching it
    Link {
        /// Caller phone number
        #[arg(required_unless_present = "customer")]
        number: Option<String>,

        /// Which deep link to build from the number
        #[arg(long, value_enum, default_value_t)]
        kind: LinkKind,

        /// Build a customer display link for this customer id instead
        #[arg(long, conflicts_with = "number")]
        customer: Option<String>,

        /// Routing id (overrides config)
        #[arg(long)]
        routing_id: Option<String>,

        /// Instance name (overrides config)
        #[arg(long)]
        instance: Option<String>,
    },

    /// Show or change the recipient identity the agent subscribes with
    Identity {
        #[command(subcommand)]
        identity_command: IdentityCommands,
    },

    /// Manage auto-start of the agent at login
    Autostart {
        #[command(subcommand)]
        autostart_command: AutostartCommands,
    },

    /// Show configuration, identity and certificate status
    Status,
}
