//! Simulation entities: tanks, bullets, border walls, sensor readings

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::math::Vec2;

use super::config::{ArenaStats, BulletStats, TankStats};

/// Steering input for one tank. Every axis is expected in `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TankCommand {
    /// Forward (+) or reverse (-) thrust
    pub acceleration: f32,
    /// Body turn, counter-clockwise positive
    pub turn_direction: f32,
    pub turret_turn_direction: f32,
    pub sensor_turn_direction: f32,
    #[serde(default)]
    pub shoot: bool,
}

/// Authoritative tank state
#[derive(Debug, Clone)]
pub struct Tank {
    pub id: Uuid,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Signed thrust along the body's forward axis
    pub acceleration: f32,

    pub body_rotation: f32,
    pub angular_velocity: f32,
    pub angular_acceleration: f32,

    /// Relative to the body
    pub turret_rotation: f32,
    pub turret_angular_velocity: f32,
    pub turret_angular_acceleration: f32,

    /// Relative to the body
    pub sensor_rotation: f32,
    pub sensor_angular_velocity: f32,
    pub sensor_angular_acceleration: f32,

    /// Signed; the simulation never floors it at zero
    pub health: i32,
    pub turret_heat: f32,
}

impl Tank {
    pub fn new(id: Uuid, position: Vec2, body_rotation: f32, stats: &TankStats) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            acceleration: 0.0,
            body_rotation,
            angular_velocity: 0.0,
            angular_acceleration: 0.0,
            turret_rotation: 0.0,
            turret_angular_velocity: 0.0,
            turret_angular_acceleration: 0.0,
            sensor_rotation: 0.0,
            sensor_angular_velocity: 0.0,
            sensor_angular_acceleration: 0.0,
            health: stats.starting_health,
            turret_heat: 0.0,
        }
    }

    /// Unit vector the body is facing
    pub fn forward(&self) -> Vec2 {
        Vec2::UP.rotate(self.body_rotation)
    }

    /// World heading of the gun barrel
    pub fn turret_heading(&self) -> f32 {
        self.body_rotation + self.turret_rotation
    }

    /// World heading of the sensor
    pub fn sensor_heading(&self) -> f32 {
        self.body_rotation + self.sensor_rotation
    }

    /// Body corners in world space, counter-clockwise
    pub fn corners(&self, stats: &TankStats) -> [Vec2; 4] {
        let hw = stats.half_width();
        let hh = stats.half_height();
        [
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ]
        .map(|corner| corner.rotate(self.body_rotation) + self.position)
    }

    /// Convert a world point into the body's unrotated frame
    pub fn to_local(&self, point: Vec2) -> Vec2 {
        (point - self.position).rotate(-self.body_rotation)
    }

    pub fn is_destroyed(&self) -> bool {
        self.health <= 0
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.body_rotation.is_finite()
            && self.angular_velocity.is_finite()
            && self.turret_rotation.is_finite()
            && self.sensor_rotation.is_finite()
            && self.turret_heat.is_finite()
    }
}

/// Projectile in flight
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: Uuid,
    pub position: Vec2,
    pub velocity: Vec2,
    pub shooter_id: Uuid,
}

impl Bullet {
    /// Spawn a bullet travelling along `heading`, inheriting the shooter's velocity
    pub fn new(
        position: Vec2,
        heading: f32,
        inherited_velocity: Vec2,
        shooter_id: Uuid,
        stats: &BulletStats,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            velocity: Vec2::new(0.0, stats.speed).rotate(heading) + inherited_velocity,
            shooter_id,
        }
    }
}

/// Static axis-aligned wall
#[derive(Debug, Clone, PartialEq)]
pub struct Wall {
    pub start: Vec2,
    pub width: f32,
    pub height: f32,
    pub center: Vec2,
    pub corners: [Vec2; 4],
}

impl Wall {
    pub fn new(start: Vec2, width: f32, height: f32) -> Self {
        let corners = [
            start,
            start + Vec2::new(width, 0.0),
            start + Vec2::new(width, height),
            start + Vec2::new(0.0, height),
        ];
        Self {
            start,
            width,
            height,
            center: start + Vec2::new(width / 2.0, height / 2.0),
            corners,
        }
    }

    /// The four walls bordering an arena centered on the origin.
    /// They sit just outside the visible field.
    pub fn border(arena: &ArenaStats) -> [Wall; 4] {
        let w = arena.width;
        let h = arena.height;
        let t = arena.wall_thickness;
        [
            Wall::new(Vec2::new(-w / 2.0, -t - h / 2.0), w, t),
            Wall::new(Vec2::new(-w / 2.0, h / 2.0), w, t),
            Wall::new(Vec2::new(-t - w / 2.0, -h / 2.0), t, h),
            Wall::new(Vec2::new(w / 2.0, -h / 2.0), t, h),
        ]
    }

    /// Closest point on (or inside) the wall to `point`
    pub fn clamp_point(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            point.x.clamp(self.start.x, self.start.x + self.width),
            point.y.clamp(self.start.y, self.start.y + self.height),
        )
    }
}

/// Nearest opposing tank seen by a sensor during the last tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorOutput {
    pub tank_id: Uuid,
    pub position: Vec2,
    pub distance_squared: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_tank_corners_follow_rotation() {
        let stats = TankStats::default();
        let tank = Tank::new(Uuid::new_v4(), Vec2::new(10.0, 0.0), FRAC_PI_2, &stats);
        let corners = tank.corners(&stats);

        // Rotated a quarter turn: the 60-unit side now spans X
        let min_x = corners.iter().map(|c| c.x).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|c| c.x).fold(f32::NEG_INFINITY, f32::max);
        assert!((min_x - -20.0).abs() < 1e-4);
        assert!((max_x - 40.0).abs() < 1e-4);
    }

    #[test]
    fn test_forward_is_rotated_up() {
        let stats = TankStats::default();
        let tank = Tank::new(Uuid::new_v4(), Vec2::ZERO, 3.0 * FRAC_PI_2, &stats);
        let forward = tank.forward();
        assert!((forward.x - 1.0).abs() < 1e-5);
        assert!(forward.y.abs() < 1e-5);
    }

    #[test]
    fn test_border_walls_enclose_field() {
        let arena = ArenaStats::new(100.0, 60.0);
        let walls = Wall::border(&arena);

        assert_eq!(walls[0].start, Vec2::new(-50.0, -80.0));
        assert_eq!(walls[1].start, Vec2::new(-50.0, 30.0));
        assert_eq!(walls[2].start, Vec2::new(-100.0, -30.0));
        assert_eq!(walls[3].start, Vec2::new(50.0, -30.0));
        assert_eq!(walls[3].corners[2], Vec2::new(100.0, 30.0));
        assert_eq!(walls[0].center, Vec2::new(0.0, -55.0));
    }

    #[test]
    fn test_bullet_inherits_shooter_velocity() {
        let stats = BulletStats::default();
        let bullet = Bullet::new(
            Vec2::ZERO,
            0.0,
            Vec2::new(10.0, 0.0),
            Uuid::new_v4(),
            &stats,
        );
        assert_eq!(bullet.velocity, Vec2::new(10.0, 150.0));
    }
}
