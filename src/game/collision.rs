//! Collision detection and resolution
//!
//! Rectangles (tanks, walls) are tested with the separating axis theorem and pushed
//! apart along the minimum translation vector. Bullets are circles tested against the
//! closest point of a rectangle; those tests never move anything.

use crate::math::Vec2;

use super::config::SimConfig;
use super::entities::{Bullet, Tank, Wall};

/// Overlap of two convex quads along their minimum translation axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Penetration {
    /// Unit axis pointing from the second shape toward the first
    pub normal: Vec2,
    /// Overlap along `normal`, always positive
    pub depth: f32,
}

/// Project corners onto `axis`, returning `(min, max)`.
pub fn project(corners: &[Vec2], axis: Vec2) -> (f32, f32) {
    corners
        .iter()
        .map(|corner| corner.dot(axis))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), p| {
            (min.min(p), max.max(p))
        })
}

/// Unit normal of every edge. Degenerate (zero-length) edges contribute no axis.
fn edge_normals(corners: &[Vec2; 4]) -> impl Iterator<Item = Vec2> + '_ {
    (0..corners.len()).filter_map(move |i| {
        let edge = corners[(i + 1) % corners.len()] - corners[i];
        edge.perpendicular().normalize()
    })
}

/// SAT test between two quads.
///
/// Returns `None` as soon as one axis shows no overlap. A zero overlap is treated as
/// separated so resting contact does not jitter.
pub fn sat_overlap(first: &[Vec2; 4], other: &[Vec2; 4]) -> Option<Penetration> {
    let mut best: Option<Penetration> = None;

    for axis in edge_normals(first).chain(edge_normals(other)) {
        let (min_first, max_first) = project(first, axis);
        let (min_other, max_other) = project(other, axis);

        let overlap = max_first.min(max_other) - min_first.max(min_other);
        if overlap <= 0.0 {
            return None;
        }

        // Point away from `other`
        let normal = if min_first < min_other { -axis } else { axis };

        if best.map_or(true, |b| overlap < b.depth) {
            best = Some(Penetration {
                normal,
                depth: overlap,
            });
        }
    }

    best
}

/// Push a tank out of a wall and bounce it. Returns true if they collided.
pub fn resolve_tank_wall(tank: &mut Tank, wall: &Wall, config: &SimConfig, dt: f32) -> bool {
    let Some(hit) = sat_overlap(&tank.corners(&config.tank), &wall.corners) else {
        return false;
    };

    tank.position += hit.normal * hit.depth;

    let contact = wall.clamp_point(tank.position);
    apply_impulse(tank, hit.normal, contact, config, dt);
    true
}

/// Push two tanks apart (half each) and bounce both. Returns true if they collided.
pub fn resolve_tank_tank(first: &mut Tank, other: &mut Tank, config: &SimConfig, dt: f32) -> bool {
    let Some(hit) = sat_overlap(&first.corners(&config.tank), &other.corners(&config.tank)) else {
        return false;
    };

    let correction = hit.normal * (hit.depth / 2.0);
    first.position += correction;
    other.position -= correction;

    let contact = (first.position + other.position) / 2.0;
    apply_impulse(first, hit.normal, contact, config, dt);
    apply_impulse(other, -hit.normal, contact, config, dt);
    true
}

/// Apply a restitution impulse along `normal` at `contact`, scaled by the tick length
fn apply_impulse(tank: &mut Tank, normal: Vec2, contact: Vec2, config: &SimConfig, dt: f32) {
    let mass = config.tank.mass();
    let inertia = config.tank.moment_of_inertia();

    let offset = contact - tank.position;
    let contact_velocity = tank.velocity + offset.perpendicular() * tank.angular_velocity;

    let j = -(1.0 + config.restitution) * contact_velocity.dot(normal) / (1.0 / mass);
    let impulse = normal * j;

    tank.velocity += impulse * dt / mass;
    tank.angular_velocity += offset.cross(impulse) * dt / inertia;
}

/// Circle vs rotated tank body
pub fn bullet_hits_tank(bullet: &Bullet, tank: &Tank, config: &SimConfig) -> bool {
    let local = tank.to_local(bullet.position);
    let hw = config.tank.half_width();
    let hh = config.tank.half_height();
    let closest = Vec2::new(local.x.clamp(-hw, hw), local.y.clamp(-hh, hh));

    let radius = config.bullet.radius;
    local.distance_squared(closest) <= radius * radius
}

/// Circle vs axis-aligned wall
pub fn bullet_hits_wall(bullet: &Bullet, wall: &Wall, config: &SimConfig) -> bool {
    let closest = wall.clamp_point(bullet.position);
    let radius = config.bullet.radius;
    bullet.position.distance_squared(closest) <= radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_4, SQRT_2};
    use uuid::Uuid;

    fn square(center: Vec2, half: f32, rotation: f32) -> [Vec2; 4] {
        [
            Vec2::new(-half, -half),
            Vec2::new(half, -half),
            Vec2::new(half, half),
            Vec2::new(-half, half),
        ]
        .map(|c| c.rotate(rotation) + center)
    }

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-4, "expected {b}, got {a}");
    }

    #[test]
    fn test_sat_axis_aligned_overlap() {
        let a = square(Vec2::ZERO, 1.0, 0.0);
        let b = square(Vec2::new(1.5, 0.5), 1.0, 0.0);

        let hit = sat_overlap(&a, &b).expect("squares overlap");
        assert_close(hit.depth, 0.5);
        assert_close(hit.normal.x, -1.0);
        assert_close(hit.normal.y, 0.0);

        // Swapping the shapes flips the normal
        let hit = sat_overlap(&b, &a).unwrap();
        assert_close(hit.depth, 0.5);
        assert_close(hit.normal.x, 1.0);
    }

    #[test]
    fn test_sat_rotated_overlap() {
        let a = square(Vec2::ZERO, 1.0, 0.0);
        let b = square(Vec2::new(2.2, 0.0), 1.0, FRAC_PI_4);

        // B's left vertex reaches x = 2.2 - √2
        let hit = sat_overlap(&a, &b).expect("diamond tip overlaps");
        assert_close(hit.depth, 1.0 - (2.2 - SQRT_2));
        assert_close(hit.normal.x, -1.0);
        assert_close(hit.normal.y, 0.0);
    }

    #[test]
    fn test_sat_no_false_positives() {
        let a = square(Vec2::ZERO, 1.0, 0.0);

        assert!(sat_overlap(&a, &square(Vec2::new(2.5, 0.0), 1.0, 0.0)).is_none());
        assert!(sat_overlap(&a, &square(Vec2::new(0.0, -2.01), 1.0, 0.0)).is_none());
        // Exactly touching is not a collision
        assert!(sat_overlap(&a, &square(Vec2::new(2.0, 0.0), 1.0, 0.0)).is_none());
        // Rotated, with a gap on the diamond's own axis only
        assert!(sat_overlap(&a, &square(Vec2::new(2.0, 2.0), 1.0, FRAC_PI_4)).is_none());
    }

    #[test]
    fn test_tank_tank_resolution_leaves_no_penetration() {
        let config = SimConfig::default();
        let mut first = Tank::new(Uuid::new_v4(), Vec2::new(-15.0, 0.0), 0.0, &config.tank);
        let mut other = Tank::new(Uuid::new_v4(), Vec2::new(15.0, 5.0), 0.3, &config.tank);

        let before = sat_overlap(&first.corners(&config.tank), &other.corners(&config.tank))
            .expect("tanks start overlapping");

        assert!(resolve_tank_tank(&mut first, &mut other, &config, 1.0 / 60.0));

        let (min_first, max_first) = project(&first.corners(&config.tank), before.normal);
        let (min_other, max_other) = project(&other.corners(&config.tank), before.normal);
        let residual = max_first.min(max_other) - min_first.max(min_other);
        assert!(residual <= 1e-3, "residual penetration {residual}");
    }

    #[test]
    fn test_tank_tank_split_is_symmetric() {
        let config = SimConfig::default();
        let mut first = Tank::new(Uuid::new_v4(), Vec2::new(-10.0, 0.0), 0.0, &config.tank);
        let mut other = Tank::new(Uuid::new_v4(), Vec2::new(10.0, 0.0), 0.0, &config.tank);

        assert!(resolve_tank_tank(&mut first, &mut other, &config, 0.0));
        // 40-wide bodies 20 apart overlap by 20 on X
        assert_close(first.position.x, -20.0);
        assert_close(other.position.x, 20.0);
    }

    #[test]
    fn test_tank_pushed_out_of_wall() {
        let config = SimConfig::default();
        let wall = Wall::new(Vec2::new(100.0, -100.0), 50.0, 200.0);
        // Right edge at x = 110, 10 units inside the wall
        let mut tank = Tank::new(Uuid::new_v4(), Vec2::new(90.0, 0.0), 0.0, &config.tank);
        tank.velocity = Vec2::new(50.0, 0.0);

        assert!(resolve_tank_wall(&mut tank, &wall, &config, 1.0 / 60.0));
        assert_close(tank.position.x, 80.0);
        // Bounce impulse pushes velocity away from the wall
        assert!(tank.velocity.x < 50.0);

        assert!(!resolve_tank_wall(&mut tank, &wall, &config, 1.0 / 60.0));
    }

    #[test]
    fn test_bullet_vs_rotated_tank() {
        let config = SimConfig::default();
        let tank = Tank::new(Uuid::new_v4(), Vec2::ZERO, FRAC_PI_4 * 2.0, &config.tank);
        let mut bullet = Bullet {
            id: Uuid::new_v4(),
            position: Vec2::new(34.0, 0.0),
            velocity: Vec2::ZERO,
            shooter_id: Uuid::new_v4(),
        };

        // Rotated a quarter turn the body reaches x = 30; radius 5 covers 34
        assert!(bullet_hits_tank(&bullet, &tank, &config));

        bullet.position = Vec2::new(0.0, 26.0);
        assert!(!bullet_hits_tank(&bullet, &tank, &config));
    }

    #[test]
    fn test_bullet_vs_wall() {
        let config = SimConfig::default();
        let wall = Wall::new(Vec2::new(0.0, 0.0), 10.0, 10.0);
        let mut bullet = Bullet {
            id: Uuid::new_v4(),
            position: Vec2::new(-5.0, 5.0),
            velocity: Vec2::ZERO,
            shooter_id: Uuid::new_v4(),
        };
        assert!(bullet_hits_wall(&bullet, &wall, &config));

        bullet.position = Vec2::new(-5.1, 5.0);
        assert!(!bullet_hits_wall(&bullet, &wall, &config));
    }
}
