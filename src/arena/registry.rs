//! Connected tanks and their match assignments

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::ArenaError;

/// A connected tank client
#[derive(Debug, Clone, Serialize)]
pub struct TankEntry {
    pub id: Uuid,
    #[serde(skip)]
    pub connection_id: Uuid,
    pub name: String,
    /// Match this tank is currently fighting in
    pub match_id: Option<Uuid>,
}

impl TankEntry {
    pub fn is_available(&self) -> bool {
        self.match_id.is_none()
    }
}

/// Registry of connected tanks.
///
/// Every operation holds the lock only for the map access itself.
#[derive(Default)]
pub struct TankRegistry {
    tanks: Mutex<HashMap<Uuid, TankEntry>>,
}

impl TankRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tank for a connection
    pub fn register(&self, connection_id: Uuid, name: String) -> TankEntry {
        let entry = TankEntry {
            id: Uuid::new_v4(),
            connection_id,
            name,
            match_id: None,
        };
        self.tanks.lock().insert(entry.id, entry.clone());
        entry
    }

    /// Remove the tank owned by a connection, if any
    pub fn remove_connection(&self, connection_id: Uuid) -> Option<TankEntry> {
        let mut tanks = self.tanks.lock();
        let id = tanks
            .values()
            .find(|t| t.connection_id == connection_id)
            .map(|t| t.id)?;
        tanks.remove(&id)
    }

    pub fn get(&self, tank_id: Uuid) -> Option<TankEntry> {
        self.tanks.lock().get(&tank_id).cloned()
    }

    pub fn by_connection(&self, connection_id: Uuid) -> Option<TankEntry> {
        self.tanks
            .lock()
            .values()
            .find(|t| t.connection_id == connection_id)
            .cloned()
    }

    /// The match a tank is assigned to
    pub fn match_of(&self, tank_id: Uuid) -> Result<Uuid, ArenaError> {
        let tanks = self.tanks.lock();
        let entry = tanks.get(&tank_id).ok_or(ArenaError::UnknownTank(tank_id))?;
        entry.match_id.ok_or(ArenaError::NotInMatch(tank_id))
    }

    pub fn all(&self) -> Vec<TankEntry> {
        self.tanks.lock().values().cloned().collect()
    }

    pub fn available(&self) -> Vec<TankEntry> {
        self.tanks
            .lock()
            .values()
            .filter(|t| t.is_available())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tanks.lock().len()
    }

    /// Assign two distinct available tanks to a match.
    ///
    /// `commit` runs inside the same critical section once both tanks are
    /// claimed, so a concurrent disconnect sees either no assignment or a
    /// fully published match.
    pub fn assign_pair<F>(
        &self,
        first: Uuid,
        second: Uuid,
        match_id: Uuid,
        commit: F,
    ) -> Result<[TankEntry; 2], ArenaError>
    where
        F: FnOnce(),
    {
        if first == second {
            return Err(ArenaError::SameTank(first));
        }

        let mut tanks = self.tanks.lock();
        for id in [first, second] {
            let entry = tanks.get(&id).ok_or(ArenaError::UnknownTank(id))?;
            if let Some(current) = entry.match_id {
                return Err(ArenaError::TankBusy { tank_id: id, match_id: current });
            }
        }

        let mut claimed = Vec::with_capacity(2);
        for id in [first, second] {
            if let Some(entry) = tanks.get_mut(&id) {
                entry.match_id = Some(match_id);
                claimed.push(entry.clone());
            }
        }
        commit();

        claimed
            .try_into()
            .map_err(|_| ArenaError::UnknownTank(second))
    }

    /// Clear the assignment of every tank still bound to `match_id`
    pub fn release(&self, match_id: Uuid) -> Vec<TankEntry> {
        let mut tanks = self.tanks.lock();
        tanks
            .values_mut()
            .filter(|t| t.match_id == Some(match_id))
            .map(|t| {
                t.match_id = None;
                t.clone()
            })
            .collect()
    }
}
