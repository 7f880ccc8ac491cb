//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::arena::ArenaSettings;
use crate::game::config::{ArenaStats, SimConfig};
use crate::game::MatchTiming;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated. Any origin when unset.
    pub client_origin: Option<String>,

    /// Playable field size in world units
    pub arena_width: f32,
    pub arena_height: f32,

    /// Match loop wakeups per second
    pub tick_rate: u32,
    /// Snapshots published per second
    pub publish_rate: u32,
    /// Physics sub-steps per tick
    pub substeps: u32,
    pub match_time_limit: Duration,
    pub match_start_delay: Duration,
    /// Fixed seed for reproducible matches
    pub sim_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: None,
            arena_width: 1200.0,
            arena_height: 720.0,
            tick_rate: 60,
            publish_rate: 60,
            substeps: 5,
            match_time_limit: Duration::from_secs(60),
            match_start_delay: Duration::from_millis(1000),
            sim_seed: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (lookup("PORT"), lookup("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port)
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (None, Some(addr)) => addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
            (None, None) => defaults.server_addr,
        };

        let config = Self {
            server_addr,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            client_origin: lookup("CLIENT_ORIGIN").filter(|s| !s.trim().is_empty()),
            arena_width: parse_or(&lookup, "ARENA_WIDTH", defaults.arena_width)?,
            arena_height: parse_or(&lookup, "ARENA_HEIGHT", defaults.arena_height)?,
            tick_rate: parse_or(&lookup, "TICK_RATE", defaults.tick_rate)?,
            publish_rate: parse_or(&lookup, "PUBLISH_RATE", defaults.publish_rate)?,
            substeps: parse_or(&lookup, "SUBSTEPS", defaults.substeps)?,
            match_time_limit: Duration::from_secs(parse_or(
                &lookup,
                "MATCH_TIME_LIMIT_SECS",
                defaults.match_time_limit.as_secs(),
            )?),
            match_start_delay: Duration::from_millis(parse_or(
                &lookup,
                "MATCH_START_DELAY_MS",
                defaults.match_start_delay.as_millis() as u64,
            )?),
            sim_seed: lookup("SIM_SEED")
                .map(|raw| raw.parse().map_err(|_| ConfigError::Invalid("SIM_SEED", raw)))
                .transpose()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &'static str, value: f32| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(key, value.to_string()))
            }
        };
        positive("ARENA_WIDTH", self.arena_width)?;
        positive("ARENA_HEIGHT", self.arena_height)?;

        for (key, value) in [
            ("TICK_RATE", self.tick_rate),
            ("PUBLISH_RATE", self.publish_rate),
            ("SUBSTEPS", self.substeps),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(key, value.to_string()));
            }
        }
        Ok(())
    }

    /// Simulation constants for this arena
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            arena: ArenaStats::new(self.arena_width, self.arena_height),
            substeps: self.substeps,
            ..SimConfig::default()
        }
    }

    pub fn match_timing(&self) -> MatchTiming {
        MatchTiming {
            tick_rate: self.tick_rate,
            publish_rate: self.publish_rate,
            time_limit: self.match_time_limit,
            start_delay: self.match_start_delay,
        }
    }

    pub fn arena_settings(&self) -> ArenaSettings {
        ArenaSettings {
            sim: self.sim_config(),
            timing: self.match_timing(),
            seed: self.sim_seed,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key, raw)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),

    #[error("Invalid server address format")]
    InvalidAddress,
}
