//! Tank registry and match orchestration

pub mod registry;
pub mod service;

pub use registry::TankEntry;
pub use service::{ArenaEvent, ArenaService, ArenaSettings, MatchSummary};

use thiserror::Error;
use uuid::Uuid;

use crate::game::SimError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArenaError {
    #[error("Unknown tank {0}")]
    UnknownTank(Uuid),

    #[error("Tank {tank_id} is already in match {match_id}")]
    TankBusy { tank_id: Uuid, match_id: Uuid },

    #[error("A match needs two different tanks, got {0} twice")]
    SameTank(Uuid),

    #[error("Tank {0} is not in a match")]
    NotInMatch(Uuid),

    #[error("Connection {0} has no tank")]
    NoTank(Uuid),

    #[error("Match {0} not found")]
    MatchNotFound(Uuid),

    #[error(transparent)]
    Simulation(#[from] SimError),
}

impl ArenaError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            ArenaError::UnknownTank(_) => "unknown_tank",
            ArenaError::TankBusy { .. } => "tank_busy",
            ArenaError::SameTank(_) => "same_tank",
            ArenaError::NotInMatch(_) => "not_in_match",
            ArenaError::NoTank(_) => "no_tank",
            ArenaError::MatchNotFound(_) => "match_not_found",
            ArenaError::Simulation(_) => "simulation",
        }
    }
}
