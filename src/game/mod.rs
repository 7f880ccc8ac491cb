//! Tank simulation: physics, combat, sensors and the per-match loop

pub mod collision;
pub mod combat;
pub mod config;
pub mod entities;
pub mod r#match;
pub mod physics;
pub mod runner;
pub mod sensor;
pub mod snapshot;

pub use combat::FireOutcome;
pub use config::SimConfig;
pub use entities::{Tank, TankCommand};
pub use r#match::{EndReason, GameMatch, MatchEvent, MatchHandle, MatchTiming};
pub use runner::{Runner, SimError};
pub use snapshot::{ArenaLayout, GameSnapshot, TankSnapshot};
