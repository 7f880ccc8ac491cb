//! Arena service - tank registration, match lifecycle and command routing

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::math::Vec2;
use crate::game::{
    EndReason, FireOutcome, GameMatch, MatchEvent, MatchHandle, MatchTiming, Runner, SimConfig,
    Tank, TankCommand,
};

use super::registry::{TankEntry, TankRegistry};
use super::ArenaError;

const MAX_NAME_LEN: usize = 32;

/// Simulation and loop settings applied to every new match
#[derive(Debug, Clone, Default)]
pub struct ArenaSettings {
    pub sim: SimConfig,
    pub timing: MatchTiming,
    /// Fixed RNG seed for every match; random per match when unset
    pub seed: Option<u64>,
}

/// Lobby-wide notifications
#[derive(Debug, Clone)]
pub enum ArenaEvent {
    TankAvailable { tank_id: Uuid, name: String },
    TankUnavailable { tank_id: Uuid },
    MatchStarted { match_id: Uuid, requester: Uuid, tank_ids: [Uuid; 2] },
    MatchEnded { match_id: Uuid, reason: EndReason },
}

/// Public view of a running match
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub id: Uuid,
    pub tank_ids: [Uuid; 2],
    pub created_at: DateTime<Utc>,
    /// Simulation sub-steps run so far
    pub steps: u64,
}

impl From<&MatchHandle> for MatchSummary {
    fn from(handle: &MatchHandle) -> Self {
        Self {
            id: handle.id,
            tank_ids: handle.tank_ids,
            created_at: handle.created_at,
            steps: handle.runner.lock().steps(),
        }
    }
}

/// Owns the tank registry and every running match
#[derive(Clone)]
pub struct ArenaService {
    registry: Arc<TankRegistry>,
    matches: Arc<DashMap<Uuid, MatchHandle>>,
    settings: Arc<ArenaSettings>,
    events_tx: broadcast::Sender<ArenaEvent>,
}

impl ArenaService {
    pub fn new(settings: ArenaSettings) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            registry: Arc::new(TankRegistry::new()),
            matches: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
            events_tx,
        }
    }

    // =========================================================================
    // Tanks
    // =========================================================================

    /// Register a tank client (called when a tank connection opens)
    pub fn register_tank(&self, connection_id: Uuid, name: &str) -> TankEntry {
        let entry = self.registry.register(connection_id, clean_name(name));

        info!(tank_id = %entry.id, name = %entry.name, "Tank registered");
        let _ = self.events_tx.send(ArenaEvent::TankAvailable {
            tank_id: entry.id,
            name: entry.name.clone(),
        });

        entry
    }

    /// Drop whatever a closed connection owned. A tank that was fighting ends
    /// its match, and so does every match the connection requested.
    pub fn disconnect(&self, connection_id: Uuid) {
        if let Some(tank) = self.registry.remove_connection(connection_id) {
            info!(tank_id = %tank.id, "Tank disconnected");
            let _ = self.events_tx.send(ArenaEvent::TankUnavailable { tank_id: tank.id });

            if let Some(match_id) = tank.match_id {
                self.end_match(match_id, EndReason::Disconnected);
            }
        }

        for match_id in self.matches_requested_by(connection_id) {
            self.end_match(match_id, EndReason::Disconnected);
        }
    }

    pub fn tanks(&self) -> Vec<TankEntry> {
        self.registry.all()
    }

    pub fn available_tanks(&self) -> Vec<TankEntry> {
        self.registry.available()
    }

    pub fn tank_count(&self) -> usize {
        self.registry.len()
    }

    // =========================================================================
    // Matches
    // =========================================================================

    /// Start a match between two available tanks.
    ///
    /// A requester runs at most one match; once both tanks are known to be
    /// free (or fighting in the requester's own match) any match it already
    /// owns is ended.
    pub fn start_match(
        &self,
        requester: Uuid,
        first: Uuid,
        second: Uuid,
    ) -> Result<MatchHandle, ArenaError> {
        if first == second {
            return Err(ArenaError::SameTank(first));
        }

        let previous = self.matches_requested_by(requester);
        for id in [first, second] {
            let tank = self.registry.get(id).ok_or(ArenaError::UnknownTank(id))?;
            if let Some(current) = tank.match_id {
                if !previous.contains(&current) {
                    return Err(ArenaError::TankBusy {
                        tank_id: id,
                        match_id: current,
                    });
                }
            }
        }

        for match_id in previous {
            self.end_match(match_id, EndReason::Replaced);
        }

        let match_id = Uuid::new_v4();
        let runner = self.build_runner(first, second);
        let (game_match, handle) = GameMatch::new(
            match_id,
            requester,
            [first, second],
            runner,
            self.settings.timing,
        );

        let matches = self.matches.clone();
        let stored = handle.clone();
        self.registry.assign_pair(first, second, match_id, move || {
            matches.insert(match_id, stored);
        })?;

        for tank_id in [first, second] {
            let _ = self.events_tx.send(ArenaEvent::TankUnavailable { tank_id });
        }
        let _ = self.events_tx.send(ArenaEvent::MatchStarted {
            match_id,
            requester,
            tank_ids: [first, second],
        });

        info!(
            match_id = %match_id,
            requester = %requester,
            first = %first,
            second = %second,
            "Match started"
        );

        let service = self.clone();
        tokio::spawn(async move {
            if let Some(reason) = game_match.run().await {
                service.end_match(match_id, reason);
            }
        });

        Ok(handle)
    }

    /// End a match and free its tanks. Returns false if it was already gone.
    pub fn end_match(&self, match_id: Uuid, reason: EndReason) -> bool {
        let Some((_, handle)) = self.matches.remove(&match_id) else {
            debug!(match_id = %match_id, "End requested for a match that is not running");
            return false;
        };

        handle.cancel();
        let _ = handle
            .events_tx
            .send(MatchEvent::RoundEnded { match_id, reason });

        for tank in self.registry.release(match_id) {
            let _ = self.events_tx.send(ArenaEvent::TankAvailable {
                tank_id: tank.id,
                name: tank.name,
            });
        }
        let _ = self.events_tx.send(ArenaEvent::MatchEnded { match_id, reason });

        info!(match_id = %match_id, reason = ?reason, "Match ended");
        true
    }

    /// End a match on request
    pub fn stop_match(&self, match_id: Uuid) -> Result<(), ArenaError> {
        if self.end_match(match_id, EndReason::Operator) {
            Ok(())
        } else {
            Err(ArenaError::MatchNotFound(match_id))
        }
    }

    pub fn get_match(&self, match_id: Uuid) -> Option<MatchHandle> {
        self.matches.get(&match_id).map(|h| h.clone())
    }

    pub fn matches(&self) -> Vec<MatchSummary> {
        let handles: Vec<MatchHandle> = self.matches.iter().map(|h| h.clone()).collect();
        handles.iter().map(MatchSummary::from).collect()
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn subscribe_match(&self, match_id: Uuid) -> Option<broadcast::Receiver<MatchEvent>> {
        self.matches.get(&match_id).map(|h| h.subscribe())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArenaEvent> {
        self.events_tx.subscribe()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Apply a command to the tank's current match
    pub fn apply_command(
        &self,
        tank_id: Uuid,
        command: &TankCommand,
    ) -> Result<Option<FireOutcome>, ArenaError> {
        let match_id = self.registry.match_of(tank_id)?;
        let handle = self
            .get_match(match_id)
            .ok_or(ArenaError::NotInMatch(tank_id))?;

        let outcome = handle.runner.lock().update_tank(tank_id, command)?;
        Ok(outcome)
    }

    /// Route a command from a connection to its tank. Failures are logged and dropped.
    pub fn command_from(&self, connection_id: Uuid, command: &TankCommand) -> Option<FireOutcome> {
        let result = self
            .registry
            .by_connection(connection_id)
            .ok_or(ArenaError::NoTank(connection_id))
            .and_then(|tank| self.apply_command(tank.id, command));

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Dropped tank command");
                None
            }
        }
    }

    fn matches_requested_by(&self, requester: Uuid) -> Vec<Uuid> {
        self.matches
            .iter()
            .filter(|h| h.requester == requester)
            .map(|h| h.id)
            .collect()
    }

    /// Two tanks mirrored across the arena center, facing each other
    fn build_runner(&self, first: Uuid, second: Uuid) -> Runner {
        let config = self.settings.sim;
        let seed = self.settings.seed.unwrap_or_else(rand::random);
        let offset = config.arena.width / 4.0;

        let mut runner = Runner::new(config, seed);
        runner.add_tank(Tank::new(
            first,
            Vec2::new(-offset, 0.0),
            3.0 * FRAC_PI_2,
            &config.tank,
        ));
        runner.add_tank(Tank::new(
            second,
            Vec2::new(offset, 0.0),
            FRAC_PI_2,
            &config.tank,
        ));
        runner
    }
}

fn clean_name(name: &str) -> String {
    let name: String = name.trim().chars().take(MAX_NAME_LEN).collect();
    if name.is_empty() {
        "tank".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn service() -> ArenaService {
        ArenaService::new(ArenaSettings {
            timing: MatchTiming {
                start_delay: Duration::ZERO,
                ..Default::default()
            },
            seed: Some(11),
            ..Default::default()
        })
    }

    fn two_tanks(service: &ArenaService) -> (TankEntry, TankEntry) {
        let a = service.register_tank(Uuid::new_v4(), "alpha");
        let b = service.register_tank(Uuid::new_v4(), "bravo");
        (a, b)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_match_assigns_tanks_and_announces() {
        let service = service();
        let (a, b) = two_tanks(&service);
        let mut lobby = service.subscribe();
        let requester = Uuid::new_v4();

        let handle = service.start_match(requester, a.id, b.id).unwrap();

        assert_eq!(service.active_matches(), 1);
        assert!(service.available_tanks().is_empty());
        assert_eq!(handle.tank_ids, [a.id, b.id]);

        let runner = handle.runner.lock();
        let first = runner.tank(a.id).unwrap();
        let second = runner.tank(b.id).unwrap();
        assert_eq!(first.position, Vec2::new(-300.0, 0.0));
        assert_eq!(second.position, Vec2::new(300.0, 0.0));
        assert!((first.forward().x - 1.0).abs() < 1e-5);
        assert!((second.forward().x + 1.0).abs() < 1e-5);
        drop(runner);

        let mut started = false;
        while let Ok(event) = lobby.try_recv() {
            if let ArenaEvent::MatchStarted { match_id, requester: who, .. } = event {
                assert_eq!(match_id, handle.id);
                assert_eq!(who, requester);
                started = true;
            }
        }
        assert!(started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_match_rejections_leave_no_state() {
        let service = service();
        let (a, b) = two_tanks(&service);
        let c = service.register_tank(Uuid::new_v4(), "charlie");

        assert_eq!(
            service.start_match(Uuid::new_v4(), a.id, a.id).unwrap_err(),
            ArenaError::SameTank(a.id)
        );
        let ghost = Uuid::new_v4();
        assert_eq!(
            service.start_match(Uuid::new_v4(), a.id, ghost).unwrap_err(),
            ArenaError::UnknownTank(ghost)
        );
        assert_eq!(service.active_matches(), 0);

        let first = service.start_match(Uuid::new_v4(), a.id, b.id).unwrap();
        let busy = service.start_match(Uuid::new_v4(), c.id, b.id).unwrap_err();
        assert_eq!(busy, ArenaError::TankBusy { tank_id: b.id, match_id: first.id });
        assert_eq!(service.active_matches(), 1);
        assert_eq!(service.available_tanks().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_match_is_idempotent() {
        let service = service();
        let (a, b) = two_tanks(&service);
        let handle = service.start_match(Uuid::new_v4(), a.id, b.id).unwrap();
        let mut events = handle.subscribe();

        assert!(service.end_match(handle.id, EndReason::Operator));
        assert!(!service.end_match(handle.id, EndReason::Operator));
        assert_eq!(
            service.stop_match(handle.id).unwrap_err(),
            ArenaError::MatchNotFound(handle.id)
        );

        assert!(handle.is_cancelled());
        assert_eq!(service.active_matches(), 0);
        assert_eq!(service.available_tanks().len(), 2);

        let mut ended = 0;
        while let Ok(event) = events.try_recv() {
            if let MatchEvent::RoundEnded { reason, .. } = event {
                assert_eq!(reason, EndReason::Operator);
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_ends_match() {
        let service = service();
        let (a, b) = two_tanks(&service);
        let handle = service.start_match(Uuid::new_v4(), a.id, b.id).unwrap();
        let mut events = handle.subscribe();

        service.disconnect(a.connection_id);

        assert_eq!(service.active_matches(), 0);
        assert_eq!(service.tank_count(), 1);
        assert!(service.available_tanks().iter().any(|t| t.id == b.id));
        match events.try_recv() {
            Ok(MatchEvent::RoundEnded { reason, .. }) => {
                assert_eq!(reason, EndReason::Disconnected)
            }
            other => panic!("expected round end, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requester_restart_replaces_previous_match() {
        let service = service();
        let (a, b) = two_tanks(&service);
        let requester = Uuid::new_v4();

        let first = assert_ok!(service.start_match(requester, a.id, b.id));
        let second = assert_ok!(service.start_match(requester, b.id, a.id));
        assert_err!(service.start_match(Uuid::new_v4(), a.id, b.id));

        assert_ne!(first.id, second.id);
        assert!(first.is_cancelled());
        assert_eq!(service.active_matches(), 1);
        assert!(service.get_match(second.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_requester_disconnect_ends_its_match() {
        let service = service();
        let (a, b) = two_tanks(&service);
        let requester = Uuid::new_v4();
        let handle = service.start_match(requester, a.id, b.id).unwrap();
        let mut events = handle.subscribe();

        service.disconnect(requester);

        assert!(handle.is_cancelled());
        assert_eq!(service.active_matches(), 0);
        assert_eq!(service.tank_count(), 2);
        assert_eq!(service.available_tanks().len(), 2);
        match events.try_recv() {
            Ok(MatchEvent::RoundEnded { reason, .. }) => {
                assert_eq!(reason, EndReason::Disconnected)
            }
            other => panic!("expected round end, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_rejection_keeps_requester_match() {
        let service = service();
        let (a, b) = two_tanks(&service);
        let (c, d) = two_tanks(&service);
        let requester = Uuid::new_v4();

        let mine = service.start_match(requester, a.id, b.id).unwrap();
        let theirs = service.start_match(Uuid::new_v4(), c.id, d.id).unwrap();

        let busy = service.start_match(requester, a.id, c.id).unwrap_err();
        assert_eq!(busy, ArenaError::TankBusy { tank_id: c.id, match_id: theirs.id });

        assert!(!mine.is_cancelled());
        assert_eq!(service.active_matches(), 2);
        assert_eq!(service.registry.match_of(a.id).unwrap(), mine.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_routing() {
        let service = service();
        let (a, b) = two_tanks(&service);

        assert_eq!(
            service.apply_command(a.id, &TankCommand::default()).unwrap_err(),
            ArenaError::NotInMatch(a.id)
        );
        assert_eq!(service.command_from(Uuid::new_v4(), &TankCommand::default()), None);

        let handle = service.start_match(Uuid::new_v4(), a.id, b.id).unwrap();
        let command = TankCommand {
            acceleration: 1.0,
            shoot: true,
            ..Default::default()
        };
        let outcome = service.command_from(a.connection_id, &command);

        assert!(matches!(outcome, Some(FireOutcome::Fired { .. })));
        let runner = handle.runner.lock();
        assert_eq!(runner.tank(a.id).unwrap().acceleration, 500.0);
        assert_eq!(runner.bullets().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_ends_when_tank_destroyed() {
        let service = service();
        let (a, b) = two_tanks(&service);
        let handle = service.start_match(Uuid::new_v4(), a.id, b.id).unwrap();
        let mut events = handle.subscribe();
        handle.runner.lock().tank_mut(b.id).unwrap().health = 10;

        let fire = TankCommand {
            shoot: true,
            ..Default::default()
        };
        service.apply_command(a.id, &fire).unwrap();

        // Muzzle to target edge is 520 units at 150 units/s
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(service.active_matches(), 0);
        assert_eq!(service.available_tanks().len(), 2);

        let mut reason = None;
        loop {
            match events.try_recv() {
                Ok(MatchEvent::RoundEnded { reason: r, .. }) => reason = Some(r),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        assert_eq!(reason, Some(EndReason::TankDestroyed));
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  viper "), "viper");
        assert_eq!(clean_name(""), "tank");
        assert_eq!(clean_name(&"x".repeat(50)).len(), MAX_NAME_LEN);
    }
}
