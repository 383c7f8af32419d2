//! The per-shard gateway state machine and its event/command types

mod commands;
mod events;
mod handler;

pub use commands::{GatewayCommand, GatewayCommander};
pub use events::{GatewayEvent, READY, RESUMED};
pub use handler::{CloseOptions, GatewayHandler};
