//! Simulation tuning constants
//!
//! Every physical constant lives here instead of on the entity types so a match (or a
//! test) can run with its own tuning.

/// Tank body constants
#[derive(Debug, Clone, Copy)]
pub struct TankStats {
    /// Body width (local X extent)
    pub width: f32,
    /// Body height (local Y extent, forward axis)
    pub height: f32,
    /// Material density used to derive mass
    pub density: f32,
    /// Extrusion depth used to derive mass
    pub depth: f32,
    /// Distance from body center to muzzle
    pub turret_length: f32,

    /// Maximum linear acceleration (units/s²)
    pub max_acceleration: f32,
    /// Maximum linear speed (units/s)
    pub max_speed: f32,
    /// Body turn limits (rad/s², rad/s)
    pub max_angular_acceleration: f32,
    pub max_angular_velocity: f32,
    /// Turret turn limits (rad/s², rad/s)
    pub max_turret_angular_acceleration: f32,
    pub max_turret_angular_velocity: f32,
    /// Sensor turn limits (rad/s², rad/s)
    pub max_sensor_angular_acceleration: f32,
    pub max_sensor_angular_velocity: f32,

    /// Fraction of linear velocity kept after one second
    pub friction: f32,
    /// Fraction of angular velocity kept after one second
    pub angular_friction: f32,
    /// Share of backward drift kept each tick
    pub lateral_damping: f32,

    pub starting_health: i32,
}

impl TankStats {
    pub fn half_width(&self) -> f32 {
        self.width / 2.0
    }

    pub fn half_height(&self) -> f32 {
        self.height / 2.0
    }

    pub fn mass(&self) -> f32 {
        self.density * self.width * self.height * self.depth
    }

    pub fn moment_of_inertia(&self) -> f32 {
        self.mass() / 12.0 * (self.width * self.width + self.height * self.height)
    }
}

impl Default for TankStats {
    fn default() -> Self {
        Self {
            width: 40.0,
            height: 60.0,
            density: 78.0,
            depth: 40.0,
            turret_length: 50.0,
            max_acceleration: 500.0,
            max_speed: 200.0,
            max_angular_acceleration: 50.0,
            max_angular_velocity: 2.5,
            max_turret_angular_acceleration: 50.0,
            max_turret_angular_velocity: 1.5,
            max_sensor_angular_acceleration: 100.0,
            max_sensor_angular_velocity: 15.0,
            friction: 0.1,
            angular_friction: 0.00001,
            lateral_damping: 0.25,
            starting_health: 100,
        }
    }
}

/// Bullet constants
#[derive(Debug, Clone, Copy)]
pub struct BulletStats {
    /// Muzzle speed relative to the firing tank
    pub speed: f32,
    pub radius: f32,
    /// Health removed from a tank on hit
    pub damage: i32,
}

impl Default for BulletStats {
    fn default() -> Self {
        Self {
            speed: 150.0,
            radius: 5.0,
            damage: 10,
        }
    }
}

/// Turret heat rules
#[derive(Debug, Clone, Copy)]
pub struct HeatStats {
    pub max_heat: f32,
    /// Base heat added per shot, before the quadratic ramp
    pub heat_per_shot: f32,
    /// Above this heat a shot may misfire
    pub overheat_threshold: f32,
    /// Chance that a shot fired above the threshold misfires
    pub misfire_chance: f64,
    /// Heat removed per second
    pub dissipation_per_second: f32,
    /// Self-damage when firing at max heat
    pub overheat_damage: i32,
}

impl Default for HeatStats {
    fn default() -> Self {
        Self {
            max_heat: 100.0,
            heat_per_shot: 20.0,
            overheat_threshold: 70.0,
            misfire_chance: 0.5,
            dissipation_per_second: 15.0,
            overheat_damage: 1,
        }
    }
}

/// Arena dimensions and border
#[derive(Debug, Clone, Copy)]
pub struct ArenaStats {
    /// Visible field width, centered on the origin
    pub width: f32,
    /// Visible field height, centered on the origin
    pub height: f32,
    /// Border wall thickness
    pub wall_thickness: f32,
    /// Bullets farther than this (squared) from the origin are dropped
    pub bullet_max_distance_squared: f32,
    /// Sensor ray length
    pub sensor_range: f32,
}

impl ArenaStats {
    pub fn new(width: f32, height: f32) -> Self {
        let reach = width.max(height) * 2.0;
        Self {
            width,
            height,
            wall_thickness: 50.0,
            bullet_max_distance_squared: reach * reach,
            sensor_range: 1500.0,
        }
    }
}

impl Default for ArenaStats {
    fn default() -> Self {
        Self::new(1200.0, 720.0)
    }
}

/// Full simulation configuration for one runner
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    pub tank: TankStats,
    pub bullet: BulletStats,
    pub heat: HeatStats,
    pub arena: ArenaStats,
    /// Coefficient of restitution for tank collisions
    pub restitution: f32,
    /// Fixed sub-steps per `Runner::update` call
    pub substeps: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tank: TankStats::default(),
            bullet: BulletStats::default(),
            heat: HeatStats::default(),
            arena: ArenaStats::default(),
            restitution: 0.5,
            substeps: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_tank_constants() {
        let stats = TankStats::default();
        assert_eq!(stats.mass(), 78.0 * 40.0 * 60.0 * 40.0);
        let expected = stats.mass() / 12.0 * (40.0 * 40.0 + 60.0 * 60.0);
        assert!((stats.moment_of_inertia() - expected).abs() / expected < 1e-6);
        assert_eq!(stats.half_width(), 20.0);
        assert_eq!(stats.half_height(), 30.0);
    }
}
