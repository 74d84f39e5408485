pub mod schema;

pub use schema::{
    AgentConfig, Config, DispatchConfig, MIN_LENGTH_RANGE, MailboxConfig, ObservabilityConfig,
    RelayConfig, StatePaths,
};
