#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod agent;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod mailbox;
pub mod observer;
pub mod pipeline;
#[doc(hidden)]
pub mod platform;
pub mod relay;

pub use commands::{AutostartCommands, IdentityCommands, LinkKind};
pub use config::Config;
pub use error::ScreenPopError;
