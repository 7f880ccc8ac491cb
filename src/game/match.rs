//! Match handle and real-time tick loop

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::runner::{Runner, SimError};
use super::snapshot::{ArenaLayout, GameSnapshot, SnapshotBuilder};

/// Why a round ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A tank's health reached zero
    TankDestroyed,
    /// Wall-clock limit elapsed
    TimeLimit,
    /// A participating tank disconnected
    Disconnected,
    /// Ended on request
    Operator,
    /// The requester started a new match in its place
    Replaced,
}

/// Events published to a match's subscribers
#[derive(Debug, Clone)]
pub enum MatchEvent {
    State(GameSnapshot),
    RoundEnded { match_id: Uuid, reason: EndReason },
}

/// Loop timing for a match
#[derive(Debug, Clone, Copy)]
pub struct MatchTiming {
    /// Target loop wakeups per second
    pub tick_rate: u32,
    /// Maximum snapshots per second
    pub publish_rate: u32,
    /// Round ends after this much running time
    pub time_limit: Duration,
    /// Pause between creation and the first tick
    pub start_delay: Duration,
}

impl Default for MatchTiming {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            publish_rate: 60,
            time_limit: Duration::from_secs(60),
            start_delay: Duration::from_secs(1),
        }
    }
}

/// Handle to a running match, shared by the orchestrator and command intake
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    /// Connection that requested the match
    pub requester: Uuid,
    pub tank_ids: [Uuid; 2],
    pub created_at: DateTime<Utc>,
    pub layout: Arc<ArenaLayout>,
    pub runner: Arc<Mutex<Runner>>,
    pub events_tx: broadcast::Sender<MatchEvent>,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for MatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchHandle")
            .field("id", &self.id)
            .field("requester", &self.requester)
            .field("tank_ids", &self.tank_ids)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl MatchHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.events_tx.subscribe()
    }

    /// Stop the loop. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

/// The authoritative tick loop for one match
pub struct GameMatch {
    id: Uuid,
    runner: Arc<Mutex<Runner>>,
    events_tx: broadcast::Sender<MatchEvent>,
    cancel_rx: watch::Receiver<bool>,
    snapshot_builder: SnapshotBuilder,
    timing: MatchTiming,
    tick: u64,
}

impl GameMatch {
    /// Create a match around a prepared runner
    pub fn new(
        id: Uuid,
        requester: Uuid,
        tank_ids: [Uuid; 2],
        runner: Runner,
        timing: MatchTiming,
    ) -> (Self, MatchHandle) {
        let layout = Arc::new(ArenaLayout::new(&runner.config().arena, runner.walls()));
        let runner = Arc::new(Mutex::new(runner));
        let (events_tx, _) = broadcast::channel(64);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = MatchHandle {
            id,
            requester,
            tank_ids,
            created_at: Utc::now(),
            layout,
            runner: runner.clone(),
            events_tx: events_tx.clone(),
            cancel_tx: Arc::new(cancel_tx),
        };

        let game_match = Self {
            id,
            runner,
            events_tx,
            cancel_rx,
            snapshot_builder: SnapshotBuilder::new(timing.publish_rate),
            timing,
            tick: 0,
        };

        (game_match, handle)
    }

    /// Run until the round ends on its own (`Some(reason)`) or is cancelled (`None`)
    pub async fn run(mut self) -> Option<EndReason> {
        info!(match_id = %self.id, "Match loop starting");

        tokio::select! {
            _ = tokio::time::sleep(self.timing.start_delay) => {}
            _ = cancelled(&mut self.cancel_rx) => return None,
        }

        let tick_duration = Duration::from_secs_f64(1.0 / self.timing.tick_rate.max(1) as f64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Instant::now();
        let mut last_wake = started;

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx) => {
                    debug!(match_id = %self.id, "Match loop cancelled");
                    return None;
                }
                _ = tick_interval.tick() => {}
            }

            let now = Instant::now();
            let elapsed = now - last_wake;
            last_wake = now;
            self.tick += 1;

            // A single bad tick must not kill the match
            match catch_unwind(AssertUnwindSafe(|| self.run_tick(elapsed, now - started))) {
                Ok(Ok(true)) => return Some(EndReason::TankDestroyed),
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    error!(match_id = %self.id, tick = self.tick, error = %e, "Tick failed");
                }
                Err(_) => {
                    error!(match_id = %self.id, tick = self.tick, "Tick panicked");
                }
            }

            if now - started >= self.timing.time_limit {
                return Some(EndReason::TimeLimit);
            }
        }
    }

    /// Advance the runner and publish if due. Returns true once a tank is destroyed.
    fn run_tick(&mut self, elapsed: Duration, since_start: Duration) -> Result<bool, SimError> {
        let (snapshot, destroyed) = {
            let mut runner = self.runner.lock();
            runner.update(elapsed.as_secs_f32())?;

            let destroyed = runner.any_destroyed();
            let due = self.snapshot_builder.should_send(elapsed);
            let snapshot = (due || destroyed)
                .then(|| self.snapshot_builder.build(self.id, &runner, self.tick, since_start));
            (snapshot, destroyed)
        };

        if let Some(snapshot) = snapshot {
            // No subscribers is fine
            let _ = self.events_tx.send(MatchEvent::State(snapshot));
        }

        Ok(destroyed)
    }
}

/// Resolves once the flag is set or the sender is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
