mod agent;
mod core;
mod dispatch;
mod mailbox;
mod observability;
mod relay;

pub use agent::AgentConfig;
pub use core::{Config, StatePaths};
pub use dispatch::{DispatchConfig, MIN_LENGTH_RANGE};
pub use mailbox::MailboxConfig;
pub use observability::ObservabilityConfig;
pub use relay::RelayConfig;
