//! Inventory ledger for storage units.
//!
//! Owns every unit's availability flag and the transitions between
//! `Available`, `Reserved`, and `Occupied`. This ledger is CRITICAL for
//! preventing double-booking: each operation is a single compare-and-swap
//! under one write lock, so it either fully applies or leaves the unit
//! untouched.
//!
//! All writes flow through the booking manager (plus startup seeding), which
//! keeps the ledger single-mutator: two bookings racing for the same unit
//! resolve to exactly one winner, the loser gets a recoverable conflict.

use crate::types::{StorageUnit, UnitId, UnitStatus};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors returned by ledger transitions
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The unit does not exist
    #[error("storage unit {0} not found")]
    NotFound(UnitId),

    /// The unit was not in the expected prior state
    ///
    /// This is an expected, recoverable outcome (a race with another booking
    /// attempt), never a fatal error.
    #[error("storage unit {unit_id} is {status}, expected {expected}")]
    Conflict {
        /// Unit that rejected the transition
        unit_id: UnitId,
        /// Status the unit actually had
        status: UnitStatus,
        /// Status the transition required
        expected: UnitStatus,
    },
}

/// In-memory ledger of storage units, addressed by unit ID
pub struct InventoryLedger {
    units: RwLock<HashMap<UnitId, StorageUnit>>,
}

impl InventoryLedger {
    /// Creates an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self {
            units: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a unit (startup seeding; catalog CRUD is out of scope)
    pub async fn register(&self, unit: StorageUnit) {
        self.units.write().await.insert(unit.id, unit);
    }

    /// Flips an `Available` unit to `Reserved`
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] when the unit is already held and
    /// [`LedgerError::NotFound`] for unknown units.
    pub async fn reserve(&self, unit_id: UnitId) -> Result<(), LedgerError> {
        self.transition(unit_id, UnitStatus::Available, UnitStatus::Reserved)
            .await
    }

    /// Flips a `Reserved` unit to `Occupied` (payment confirmed)
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] when the unit is not reserved and
    /// [`LedgerError::NotFound`] for unknown units.
    pub async fn occupy(&self, unit_id: UnitId) -> Result<(), LedgerError> {
        self.transition(unit_id, UnitStatus::Reserved, UnitStatus::Occupied)
            .await
    }

    /// Returns a held unit to the available pool
    ///
    /// Used on cancellation and expiry. Releasing a unit that is already
    /// `Available` is a no-op so that idempotent reverts stay idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for unknown units.
    pub async fn release(&self, unit_id: UnitId) -> Result<(), LedgerError> {
        let mut units = self.units.write().await;
        let unit = units
            .get_mut(&unit_id)
            .ok_or(LedgerError::NotFound(unit_id))?;
        unit.status = UnitStatus::Available;
        Ok(())
    }

    /// Snapshot of a single unit
    pub async fn get(&self, unit_id: UnitId) -> Option<StorageUnit> {
        self.units.read().await.get(&unit_id).cloned()
    }

    /// Snapshot of every unit (seeding checks, tests)
    pub async fn snapshot(&self) -> Vec<StorageUnit> {
        self.units.read().await.values().cloned().collect()
    }

    async fn transition(
        &self,
        unit_id: UnitId,
        expected: UnitStatus,
        next: UnitStatus,
    ) -> Result<(), LedgerError> {
        let mut units = self.units.write().await;
        let unit = units
            .get_mut(&unit_id)
            .ok_or(LedgerError::NotFound(unit_id))?;
        if unit.status != expected {
            return Err(LedgerError::Conflict {
                unit_id,
                status: unit.status,
                expected,
            });
        }
        unit.status = next;
        Ok(())
    }
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new()
    }
}
