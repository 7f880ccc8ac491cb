//! Tank and bullet integration

use std::f32::consts::TAU;

use crate::math::Vec2;

use super::config::{HeatStats, TankStats};
use super::entities::{Bullet, Tank, TankCommand};

/// Physics system for advancing tanks and bullets by one tick
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Turn a command into accelerations for the next integration pass.
    /// Inputs are clamped to `[-1, 1]`; non-finite inputs count as zero.
    pub fn apply_command(tank: &mut Tank, command: &TankCommand, stats: &TankStats) {
        tank.angular_acceleration =
            axis_input(command.turn_direction) * stats.max_angular_acceleration;
        tank.acceleration = axis_input(command.acceleration) * stats.max_acceleration;
        tank.turret_angular_acceleration =
            axis_input(command.turret_turn_direction) * stats.max_turret_angular_acceleration;
        tank.sensor_angular_acceleration =
            axis_input(command.sensor_turn_direction) * stats.max_sensor_angular_acceleration;
    }

    /// Advance one tank by `dt` seconds
    pub fn update_tank(tank: &mut Tank, stats: &TankStats, heat: &HeatStats, dt: f32) {
        // Exponential damping keeps the decay rate independent of tick length
        let angular_friction = stats.angular_friction.powf(dt);

        // Body rotation
        (tank.body_rotation, tank.angular_velocity) = integrate_axis(
            tank.body_rotation,
            tank.angular_velocity,
            tank.angular_acceleration,
            stats.max_angular_velocity,
            angular_friction,
            dt,
        );

        // Tracks resist sliding backward relative to the hull
        let forward = tank.forward();
        let forward_speed = tank.velocity.dot(forward);
        if forward_speed < 0.0 {
            tank.velocity -= forward * forward_speed * (1.0 - stats.lateral_damping);
        }

        tank.velocity += Vec2::new(0.0, tank.acceleration).rotate(tank.body_rotation) * dt;
        tank.velocity = tank.velocity.truncate(stats.max_speed);
        tank.velocity *= stats.friction.powf(dt);

        tank.position += tank.velocity * dt;

        (tank.turret_rotation, tank.turret_angular_velocity) = integrate_axis(
            tank.turret_rotation,
            tank.turret_angular_velocity,
            tank.turret_angular_acceleration,
            stats.max_turret_angular_velocity,
            angular_friction,
            dt,
        );

        (tank.sensor_rotation, tank.sensor_angular_velocity) = integrate_axis(
            tank.sensor_rotation,
            tank.sensor_angular_velocity,
            tank.sensor_angular_acceleration,
            stats.max_sensor_angular_velocity,
            angular_friction,
            dt,
        );

        tank.turret_heat = (tank.turret_heat - heat.dissipation_per_second * dt).max(0.0);
    }

    /// Bullets fly straight with no drag
    pub fn update_bullet(bullet: &mut Bullet, dt: f32) {
        bullet.position += bullet.velocity * dt;
    }
}

/// Integrate one rotational axis; returns `(rotation, angular_velocity)`
fn integrate_axis(
    rotation: f32,
    angular_velocity: f32,
    angular_acceleration: f32,
    max_angular_velocity: f32,
    friction_factor: f32,
    dt: f32,
) -> (f32, f32) {
    let omega = (angular_velocity + angular_acceleration * dt)
        .clamp(-max_angular_velocity, max_angular_velocity)
        * friction_factor;
    (normalize_rotation(rotation + omega * dt), omega)
}

/// Wrap an angle into `[0, 2π)`
pub fn normalize_rotation(rotation: f32) -> f32 {
    let wrapped = rotation.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

fn axis_input(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use uuid::Uuid;

    const DT: f32 = 1.0 / 60.0;

    fn tank() -> Tank {
        Tank::new(Uuid::new_v4(), Vec2::ZERO, 0.0, &TankStats::default())
    }

    #[test]
    fn test_command_clamps_inputs_to_accelerations() {
        let stats = TankStats::default();
        let mut t = tank();
        let command = TankCommand {
            acceleration: 3.0,
            turn_direction: -0.5,
            turret_turn_direction: -7.0,
            sensor_turn_direction: f32::NAN,
            shoot: false,
        };

        PhysicsSystem::apply_command(&mut t, &command, &stats);

        assert_eq!(t.acceleration, stats.max_acceleration);
        assert_eq!(t.angular_acceleration, -0.5 * stats.max_angular_acceleration);
        assert_eq!(t.turret_angular_acceleration, -stats.max_turret_angular_acceleration);
        assert_eq!(t.sensor_angular_acceleration, 0.0);
        // Velocity is untouched until the next integration
        assert_eq!(t.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_thrust_moves_along_forward_axis() {
        let stats = TankStats::default();
        let heat = HeatStats::default();
        let mut t = tank();
        t.acceleration = stats.max_acceleration;

        for _ in 0..30 {
            PhysicsSystem::update_tank(&mut t, &stats, &heat, DT);
        }

        assert!(t.position.y > 0.0);
        assert!(t.position.x.abs() < 1e-4);
        assert!(t.velocity.length() <= stats.max_speed);
    }

    #[test]
    fn test_speed_never_exceeds_max() {
        let stats = TankStats::default();
        let heat = HeatStats::default();
        let mut t = tank();
        t.acceleration = stats.max_acceleration;

        for _ in 0..600 {
            PhysicsSystem::update_tank(&mut t, &stats, &heat, DT);
            assert!(t.velocity.length() <= stats.max_speed + 1e-3);
        }
    }

    #[test]
    fn test_friction_is_exponential_in_elapsed_time() {
        let stats = TankStats::default();
        let heat = HeatStats::default();

        let mut coarse = tank();
        coarse.velocity = Vec2::new(0.0, 100.0);
        PhysicsSystem::update_tank(&mut coarse, &stats, &heat, 0.5);

        let mut fine = tank();
        fine.velocity = Vec2::new(0.0, 100.0);
        for _ in 0..10 {
            PhysicsSystem::update_tank(&mut fine, &stats, &heat, 0.05);
        }

        let expected = 100.0 * stats.friction.powf(0.5);
        assert!((coarse.velocity.y - expected).abs() < 1e-3);
        assert!((fine.velocity.y - expected).abs() < 1e-3);
    }

    #[test]
    fn test_backward_drift_is_damped() {
        let stats = TankStats::default();
        let heat = HeatStats::default();
        let mut t = tank();
        // Sliding straight backward, no friction to isolate damping
        let stats = TankStats { friction: 1.0, ..stats };
        t.velocity = Vec2::new(0.0, -100.0);

        PhysicsSystem::update_tank(&mut t, &stats, &heat, DT);

        assert!((t.velocity.y - -25.0).abs() < 1e-3);
    }

    #[test]
    fn test_angular_velocity_clamped_and_rotation_wrapped() {
        let stats = TankStats { angular_friction: 1.0, ..TankStats::default() };
        let heat = HeatStats::default();
        let mut t = tank();
        t.angular_acceleration = -stats.max_angular_acceleration;

        for _ in 0..120 {
            PhysicsSystem::update_tank(&mut t, &stats, &heat, DT);
            assert!(t.angular_velocity >= -stats.max_angular_velocity);
            assert!((0.0..TAU).contains(&t.body_rotation));
        }
        assert_eq!(t.angular_velocity, -stats.max_angular_velocity);
    }

    #[test]
    fn test_turret_and_sensor_integrate_independently() {
        let stats = TankStats::default();
        let heat = HeatStats::default();
        let mut t = tank();
        t.turret_angular_acceleration = stats.max_turret_angular_acceleration;

        PhysicsSystem::update_tank(&mut t, &stats, &heat, DT);

        assert!(t.turret_rotation > 0.0);
        assert_eq!(t.sensor_rotation, 0.0);
        assert_eq!(t.body_rotation, 0.0);
    }

    #[test]
    fn test_heat_decays_to_zero() {
        let stats = TankStats::default();
        let heat = HeatStats::default();
        let mut t = tank();
        t.turret_heat = 50.0;

        PhysicsSystem::update_tank(&mut t, &stats, &heat, 1.0);
        assert!((t.turret_heat - 35.0).abs() < 1e-4);

        for _ in 0..10 {
            PhysicsSystem::update_tank(&mut t, &stats, &heat, 1.0);
        }
        assert_eq!(t.turret_heat, 0.0);
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0.0), 0.0);
        assert!((normalize_rotation(-PI / 2.0) - 1.5 * PI).abs() < 1e-5);
        assert!((normalize_rotation(3.0 * PI) - PI).abs() < 1e-5);
        assert!(normalize_rotation(-1e-9) < TAU);
    }

    #[test]
    fn test_bullet_moves_linearly() {
        let mut bullet = Bullet {
            id: Uuid::new_v4(),
            position: Vec2::new(1.0, 1.0),
            velocity: Vec2::new(10.0, -20.0),
            shooter_id: Uuid::new_v4(),
        };
        PhysicsSystem::update_bullet(&mut bullet, 0.5);
        assert_eq!(bullet.position, Vec2::new(6.0, -9.0));
    }
}
