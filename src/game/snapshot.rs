//! Snapshot building and publish throttling

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::math::Vec2;

use super::config::ArenaStats;
use super::entities::{Bullet, Tank, Wall};
use super::runner::Runner;

/// Per-tank state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankSnapshot {
    pub id: Uuid,
    pub position: Vec2,
    pub velocity: Vec2,
    pub acceleration: f32,
    pub body_rotation: f32,
    pub turret_rotation: f32,
    pub sensor_rotation: f32,
    pub health: i32,
    pub angular_velocity: f32,
    pub turret_heat: f32,
    /// What this tank's sensor saw on the last tick
    pub sensor: Option<SensorSnapshot>,
}

/// Sensed opponent as reported to the observing tank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub tank_id: Uuid,
    pub position: Vec2,
    pub health: i32,
    pub distance_squared: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletSnapshot {
    pub id: Uuid,
    pub position: Vec2,
    pub velocity: Vec2,
    pub shooter_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallSnapshot {
    pub start: Vec2,
    pub width: f32,
    pub height: f32,
}

/// Static arena description sent when a match starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaLayout {
    pub width: f32,
    pub height: f32,
    pub walls: Vec<WallSnapshot>,
}

impl ArenaLayout {
    pub fn new(arena: &ArenaStats, walls: &[Wall]) -> Self {
        Self {
            width: arena.width,
            height: arena.height,
            walls: walls.iter().map(WallSnapshot::from).collect(),
        }
    }
}

/// Full match state at one publish tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub match_id: Uuid,
    /// Loop iterations since the match started
    pub tick: u64,
    pub elapsed_ms: u64,
    pub updates_per_second: u64,
    pub timestamp: DateTime<Utc>,
    pub tanks: Vec<TankSnapshot>,
    pub bullets: Vec<BulletSnapshot>,
}

impl GameSnapshot {
    pub fn tank(&self, id: Uuid) -> Option<&TankSnapshot> {
        self.tanks.iter().find(|t| t.id == id)
    }
}

impl From<&Wall> for WallSnapshot {
    fn from(wall: &Wall) -> Self {
        Self {
            start: wall.start,
            width: wall.width,
            height: wall.height,
        }
    }
}

impl From<&Bullet> for BulletSnapshot {
    fn from(bullet: &Bullet) -> Self {
        Self {
            id: bullet.id,
            position: bullet.position,
            velocity: bullet.velocity,
            shooter_id: bullet.shooter_id,
        }
    }
}

fn tank_snapshot(tank: &Tank, runner: &Runner) -> TankSnapshot {
    let sensor = runner.sensor(tank.id).map(|reading| SensorSnapshot {
        tank_id: reading.tank_id,
        position: reading.position,
        health: runner.tank(reading.tank_id).map_or(0, |t| t.health),
        distance_squared: reading.distance_squared,
    });

    TankSnapshot {
        id: tank.id,
        position: tank.position,
        velocity: tank.velocity,
        acceleration: tank.acceleration,
        body_rotation: tank.body_rotation,
        turret_rotation: tank.turret_rotation,
        sensor_rotation: tank.sensor_rotation,
        health: tank.health,
        angular_velocity: tank.angular_velocity,
        turret_heat: tank.turret_heat,
        sensor,
    }
}

/// Builds snapshots no more often than the publish interval
pub struct SnapshotBuilder {
    publish_interval: Duration,
    since_last: Duration,
}

impl SnapshotBuilder {
    pub fn new(publish_rate: u32) -> Self {
        Self {
            publish_interval: Duration::from_secs_f64(1.0 / publish_rate.max(1) as f64),
            since_last: Duration::ZERO,
        }
    }

    /// Record elapsed time and report whether a snapshot is due
    pub fn should_send(&mut self, elapsed: Duration) -> bool {
        self.since_last += elapsed;
        if self.since_last >= self.publish_interval {
            self.since_last = Duration::ZERO;
            true
        } else {
            false
        }
    }

    /// Build a snapshot of the runner's current state
    pub fn build(
        &self,
        match_id: Uuid,
        runner: &Runner,
        tick: u64,
        elapsed: Duration,
    ) -> GameSnapshot {
        let secs = elapsed.as_secs();
        GameSnapshot {
            match_id,
            tick,
            elapsed_ms: elapsed.as_millis() as u64,
            updates_per_second: tick / (1 + secs),
            timestamp: Utc::now(),
            tanks: runner.tanks().iter().map(|t| tank_snapshot(t, runner)).collect(),
            bullets: runner.bullets().iter().map(BulletSnapshot::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::SimConfig;
    use crate::game::entities::TankCommand;

    #[test]
    fn test_publish_throttle() {
        let mut builder = SnapshotBuilder::new(20);
        let step = Duration::from_millis(20);

        assert!(!builder.should_send(step));
        assert!(!builder.should_send(step));
        assert!(builder.should_send(step));
        assert!(!builder.should_send(step));
    }

    #[test]
    fn test_snapshot_contents() {
        let config = SimConfig::default();
        let mut runner = Runner::new(config, 1);
        let a = Tank::new(Uuid::new_v4(), Vec2::new(0.0, 0.0), 0.0, &config.tank);
        let b = Tank::new(Uuid::new_v4(), Vec2::new(0.0, 200.0), 0.0, &config.tank);
        let (a_id, b_id) = (a.id, b.id);
        runner.add_tank(a);
        runner.add_tank(b);
        runner
            .update_tank(a_id, &TankCommand { shoot: true, ..Default::default() })
            .unwrap();
        runner.update(1.0 / 60.0).unwrap();

        let match_id = Uuid::new_v4();
        let snapshot =
            SnapshotBuilder::new(60).build(match_id, &runner, 120, Duration::from_secs(2));

        assert_eq!(snapshot.match_id, match_id);
        assert_eq!(snapshot.elapsed_ms, 2000);
        assert_eq!(snapshot.updates_per_second, 40);
        assert_eq!(snapshot.tanks.len(), 2);
        assert_eq!(snapshot.bullets.len(), 1);
        assert_eq!(snapshot.bullets[0].shooter_id, a_id);

        let sensor = snapshot.tank(a_id).unwrap().sensor.as_ref().unwrap();
        assert_eq!(sensor.tank_id, b_id);
        assert_eq!(sensor.health, 100);
        assert!(snapshot.tank(b_id).unwrap().sensor.is_none());
        assert!(snapshot.tank(a_id).unwrap().turret_heat > 0.0);
    }

    #[test]
    fn test_layout_lists_border_walls() {
        let config = SimConfig::default();
        let runner = Runner::new(config, 1);
        let layout = ArenaLayout::new(&config.arena, runner.walls());

        assert_eq!(layout.width, 1200.0);
        assert_eq!(layout.walls.len(), 4);
        assert_eq!(layout.walls[1].start, Vec2::new(-600.0, 360.0));
    }
}
