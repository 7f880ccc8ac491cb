//! Simulation runner for a single match
//!
//! Owns every entity of one match and advances them in a fixed order per sub-step:
//! wall collisions, tank collisions, bullet hits, integration, sensing.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use super::collision::{bullet_hits_tank, bullet_hits_wall, resolve_tank_tank, resolve_tank_wall};
use super::combat::{CombatSystem, FireOutcome, Shot};
use super::config::SimConfig;
use super::entities::{Bullet, SensorOutput, Tank, TankCommand, Wall};
use super::physics::PhysicsSystem;
use super::sensor::{record_closest, sense};

/// Errors raised by the runner
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("Tank {0} is not part of this simulation")]
    UnknownTank(Uuid),

    #[error("Tank {0} has non-finite state")]
    NonFiniteState(Uuid),

    #[error("Invalid update delta: {0}")]
    InvalidDelta(f32),
}

/// Entity set and stepping logic for one match
pub struct Runner {
    config: SimConfig,
    tanks: Vec<Tank>,
    bullets: Vec<Bullet>,
    walls: [Wall; 4],
    sensors: HashMap<Uuid, SensorOutput>,
    rng: ChaCha8Rng,
    steps: u64,
}

impl Runner {
    pub fn new(config: SimConfig, seed: u64) -> Self {
        Self {
            walls: Wall::border(&config.arena),
            config,
            tanks: Vec::with_capacity(2),
            bullets: Vec::new(),
            sensors: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            steps: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn add_tank(&mut self, tank: Tank) {
        self.tanks.push(tank);
    }

    pub fn add_bullet(&mut self, bullet: Bullet) {
        self.bullets.push(bullet);
    }

    pub fn tank(&self, id: Uuid) -> Option<&Tank> {
        self.tanks.iter().find(|t| t.id == id)
    }

    pub fn tank_mut(&mut self, id: Uuid) -> Option<&mut Tank> {
        self.tanks.iter_mut().find(|t| t.id == id)
    }

    pub fn tanks(&self) -> &[Tank] {
        &self.tanks
    }

    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn walls(&self) -> &[Wall; 4] {
        &self.walls
    }

    /// Nearest tank sensed by `id` during the last sub-step
    pub fn sensor(&self, id: Uuid) -> Option<&SensorOutput> {
        self.sensors.get(&id)
    }

    /// Sub-steps executed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// True once any tank's health has dropped to zero or below
    pub fn any_destroyed(&self) -> bool {
        self.tanks.iter().any(Tank::is_destroyed)
    }

    /// Apply a command to a tank, firing if requested
    pub fn update_tank(
        &mut self,
        id: Uuid,
        command: &TankCommand,
    ) -> Result<Option<FireOutcome>, SimError> {
        let config = self.config;
        let tank = self
            .tanks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SimError::UnknownTank(id))?;

        PhysicsSystem::apply_command(tank, command, &config.tank);

        if !command.shoot {
            return Ok(None);
        }

        let shot = CombatSystem::fire(tank, &config, &mut self.rng);
        let outcome = shot.outcome();
        if let Shot::Fired(bullet) = shot {
            self.bullets.push(bullet);
        }
        Ok(Some(outcome))
    }

    /// Advance the simulation by `delta_seconds`, split into fixed sub-steps
    pub fn update(&mut self, delta_seconds: f32) -> Result<(), SimError> {
        if !delta_seconds.is_finite() || delta_seconds < 0.0 {
            return Err(SimError::InvalidDelta(delta_seconds));
        }

        let substeps = self.config.substeps.max(1);
        let dt = delta_seconds / substeps as f32;
        for _ in 0..substeps {
            self.step(dt);
        }

        match self.tanks.iter().find(|t| !t.is_finite()) {
            Some(tank) => Err(SimError::NonFiniteState(tank.id)),
            None => Ok(()),
        }
    }

    fn step(&mut self, dt: f32) {
        let Self {
            config,
            tanks,
            bullets,
            walls,
            sensors,
            ..
        } = self;

        for tank in tanks.iter_mut() {
            for wall in walls.iter() {
                resolve_tank_wall(tank, wall, config, dt);
            }
        }

        for i in 0..tanks.len() {
            for j in (i + 1)..tanks.len() {
                let (head, tail) = tanks.split_at_mut(j);
                resolve_tank_tank(&mut head[i], &mut tail[0], config, dt);
            }
        }

        bullets.retain(|bullet| {
            if let Some(target) = tanks
                .iter_mut()
                .find(|t| t.id != bullet.shooter_id && bullet_hits_tank(bullet, t, config))
            {
                CombatSystem::apply_hit(target, &config.bullet);
                return false;
            }

            let out_of_bounds =
                bullet.position.length_squared() > config.arena.bullet_max_distance_squared;
            !(out_of_bounds || walls.iter().any(|wall| bullet_hits_wall(bullet, wall, config)))
        });

        for tank in tanks.iter_mut() {
            PhysicsSystem::update_tank(tank, &config.tank, &config.heat, dt);
        }
        for bullet in bullets.iter_mut() {
            PhysicsSystem::update_bullet(bullet, dt);
        }

        sensors.clear();
        for i in 0..tanks.len() {
            for j in (i + 1)..tanks.len() {
                let (a, b) = (&tanks[i], &tanks[j]);
                if let Some(reading) = sense(a, b, config) {
                    record_sensor(sensors, a.id, reading);
                }
                if let Some(reading) = sense(b, a, config) {
                    record_sensor(sensors, b.id, reading);
                }
            }
        }

        self.steps += 1;
    }
}

fn record_sensor(sensors: &mut HashMap<Uuid, SensorOutput>, observer: Uuid, reading: SensorOutput) {
    let mut slot = sensors.get(&observer).copied();
    record_closest(&mut slot, reading);
    if let Some(closest) = slot {
        sensors.insert(observer, closest);
    }
}
