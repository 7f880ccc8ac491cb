//! WebSocket transport for tanks and spectators

pub mod handler;
pub mod protocol;
