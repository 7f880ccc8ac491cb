//! Combat system - firing, turret heat, damage

use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::math::Vec2;

use super::config::{BulletStats, HeatStats, SimConfig};
use super::entities::{Bullet, Tank};

/// Result of a fire request. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FireOutcome {
    /// A bullet left the muzzle
    Fired { bullet_id: Uuid },
    /// Heat was spent but the hot barrel failed to fire
    Misfired,
    /// Barrel at max heat; the tank damaged itself instead
    Overheated,
}

/// What a fire attempt produced
#[derive(Debug)]
pub enum Shot {
    Fired(Bullet),
    Misfired,
    Overheated,
}

impl Shot {
    pub fn outcome(&self) -> FireOutcome {
        match self {
            Shot::Fired(bullet) => FireOutcome::Fired {
                bullet_id: bullet.id,
            },
            Shot::Misfired => FireOutcome::Misfired,
            Shot::Overheated => FireOutcome::Overheated,
        }
    }
}

/// Combat rules for firing and taking hits
pub struct CombatSystem;

impl CombatSystem {
    /// Attempt to fire the tank's gun
    pub fn fire<R: Rng + ?Sized>(tank: &mut Tank, config: &SimConfig, rng: &mut R) -> Shot {
        let heat = &config.heat;

        if tank.turret_heat >= heat.max_heat {
            tank.health -= heat.overheat_damage;
            return Shot::Overheated;
        }

        let was_hot = tank.turret_heat > heat.overheat_threshold;
        let increase = Self::heat_increase(tank.turret_heat, heat);
        tank.turret_heat = (tank.turret_heat + increase).min(heat.max_heat);

        if was_hot && rng.gen_bool(heat.misfire_chance.clamp(0.0, 1.0)) {
            return Shot::Misfired;
        }

        let heading = tank.turret_heading();
        let muzzle = tank.position + Vec2::new(0.0, config.tank.turret_length).rotate(heading);
        Shot::Fired(Bullet::new(
            muzzle,
            heading,
            tank.velocity,
            tank.id,
            &config.bullet,
        ))
    }

    /// Heat cost of a shot at the given heat; grows quadratically as the barrel warms
    pub fn heat_increase(current_heat: f32, heat: &HeatStats) -> f32 {
        let ratio = current_heat / heat.max_heat;
        heat.heat_per_shot * (1.0 + ratio * ratio)
    }

    /// Apply a bullet hit. Health is allowed to go negative.
    pub fn apply_hit(tank: &mut Tank, bullet: &BulletStats) {
        tank.health -= bullet.damage;
    }
}
