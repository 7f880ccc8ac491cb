//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::arena::ArenaEvent;
use crate::game::{ArenaLayout, EndReason, FireOutcome, GameSnapshot, TankCommand, TankSnapshot};

/// What a connection is for, chosen at upgrade time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Drives one tank
    Tank,
    /// Watches matches and may start or end them
    #[default]
    Spectator,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Control input for the connection's tank
    Command {
        /// -1.0 full reverse, 1.0 full forward
        #[serde(default)]
        acceleration: f32,
        #[serde(default)]
        turn_direction: f32,
        #[serde(default)]
        turret_turn_direction: f32,
        #[serde(default)]
        sensor_turn_direction: f32,
        #[serde(default)]
        shoot: bool,
    },

    /// Start a match between two registered tanks
    StartMatch { tank_a: Uuid, tank_b: Uuid },

    /// End a running match
    EndMatch { match_id: Uuid },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// Tank command carried by a `Command` message
    pub fn tank_command(&self) -> Option<TankCommand> {
        match *self {
            ClientMsg::Command {
                acceleration,
                turn_direction,
                turret_turn_direction,
                sensor_turn_direction,
                shoot,
            } => Some(TankCommand {
                acceleration,
                turn_direction,
                turret_turn_direction,
                sensor_turn_direction,
                shoot,
            }),
            _ => None,
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: Uuid,
        server_time: u64,
        /// Tanks that can be put into a match right now
        available_tanks: Vec<TankInfo>,
    },

    /// A tank connection was registered
    Registered { tank_id: Uuid, name: String },

    TankAvailable(TankInfo),

    TankUnavailable { tank_id: Uuid },

    /// A match this connection takes part in or requested has started
    MatchStarted {
        match_id: Uuid,
        tank_ids: [Uuid; 2],
        layout: ArenaLayout,
    },

    /// Full match state, sent to the requester
    GameState { snapshot: GameSnapshot },

    /// The receiving tank's own state, including its sensor reading
    TankState {
        match_id: Uuid,
        tick: u64,
        tank: TankSnapshot,
    },

    /// Result of a fire request
    FireResult(FireOutcome),

    RoundEnded { match_id: Uuid, reason: EndReason },

    /// Pong response
    Pong {
        /// Echo of client timestamp
        t: u64,
        /// Server timestamp
        server_t: u64,
    },

    /// Error message
    Error { code: String, message: String },
}

/// Public tank info
#[derive(Debug, Clone, Serialize)]
pub struct TankInfo {
    pub tank_id: Uuid,
    pub name: String,
}

impl ServerMsg {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Lobby events forwarded to every connection. Match lifecycle is
    /// delivered through the match's own channel instead.
    pub fn from_lobby(event: &ArenaEvent) -> Option<Self> {
        match event {
            ArenaEvent::TankAvailable { tank_id, name } => Some(ServerMsg::TankAvailable(TankInfo {
                tank_id: *tank_id,
                name: name.clone(),
            })),
            ArenaEvent::TankUnavailable { tank_id } => {
                Some(ServerMsg::TankUnavailable { tank_id: *tank_id })
            }
            ArenaEvent::MatchStarted { .. } | ArenaEvent::MatchEnded { .. } => None,
        }
    }
}
