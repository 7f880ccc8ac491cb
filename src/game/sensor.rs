//! Tank sensors
//!
//! A sensor is a ray cast from the tank center along `body + sensor` heading, up to
//! `ArenaStats::sensor_range`. It senses an opposing tank when the ray crosses that
//! tank's rotated body.

use crate::math::Vec2;

use super::config::SimConfig;
use super::entities::{SensorOutput, Tank};

/// Check whether `observer`'s sensor ray crosses `target`'s body
pub fn sense(observer: &Tank, target: &Tank, config: &SimConfig) -> Option<SensorOutput> {
    let direction = Vec2::UP.rotate(observer.sensor_heading());

    // Work in the target's unrotated frame so its body is an AABB
    let origin = target.to_local(observer.position);
    let direction = direction.rotate(-target.body_rotation);

    let half = Vec2::new(config.tank.half_width(), config.tank.half_height());
    if !ray_hits_box(origin, direction, half, config.arena.sensor_range) {
        return None;
    }

    Some(SensorOutput {
        tank_id: target.id,
        position: target.position,
        distance_squared: observer.position.distance_squared(target.position),
    })
}

/// Keep the closer of the current reading and a new candidate
pub fn record_closest(slot: &mut Option<SensorOutput>, candidate: SensorOutput) {
    match slot {
        Some(current) if current.distance_squared <= candidate.distance_squared => {}
        _ => *slot = Some(candidate),
    }
}

/// Slab test of a ray segment `[0, max_t]` against a box centered on the origin
fn ray_hits_box(origin: Vec2, direction: Vec2, half: Vec2, max_t: f32) -> bool {
    let mut t_min = 0.0_f32;
    let mut t_max = max_t;

    for (o, d, h) in [(origin.x, direction.x, half.x), (origin.y, direction.y, half.y)] {
        if d.abs() < f32::EPSILON {
            if o < -h || o > h {
                return false;
            }
            continue;
        }

        let t1 = (-h - o) / d;
        let t2 = (h - o) / d;
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
        if t_min > t_max {
            return false;
        }
    }

    true
}
