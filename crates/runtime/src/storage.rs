//! Signal storage
//!
//! One [`SignalCell`] per channel, held in a director-owned [`CellTable`]
//! arena. A cell moves from unknown to known at most once per instant; the
//! table counts those transitions so the director can detect convergence
//! through the same write path that enforces monotonicity.

use serde::{Deserialize, Serialize};

use crate::error::Unresolved;
use crate::types::{CellId, Value};

/// Two-point status lattice: `Unknown < Known`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellStatus {
    Unknown,
    Known,
}

/// Why an assertion on a known cell was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteConflict {
    /// Present with a different value.
    NonMonotonic { old: Value, new: Value },
    /// Present after absent, or absent after present.
    PresenceContradiction { existing: Option<Value> },
}

/// Storage for one producer-to-consumer channel for one instant.
#[derive(Debug, Clone)]
pub struct SignalCell {
    id: CellId,
    status: CellStatus,
    payload: Option<Value>,
    /// Set on the unknown-to-known flip, cleared at each round start.
    changed_this_round: bool,
}

impl SignalCell {
    pub fn new(id: CellId) -> Self {
        Self {
            id,
            status: CellStatus::Unknown,
            payload: None,
            changed_this_round: false,
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn status(&self) -> CellStatus {
        self.status
    }

    pub fn is_known(&self) -> bool {
        self.status == CellStatus::Known
    }

    /// True if the cell became known during the current round.
    pub fn changed_this_round(&self) -> bool {
        self.changed_this_round
    }

    /// Assert a present value.
    ///
    /// Returns `Ok(true)` if the cell just became known, `Ok(false)` for an
    /// identical re-assertion.
    pub fn assert_present(&mut self, value: Value) -> Result<bool, WriteConflict> {
        match (&self.status, &self.payload) {
            (CellStatus::Unknown, _) => {
                self.status = CellStatus::Known;
                self.payload = Some(value);
                self.changed_this_round = true;
                Ok(true)
            }
            (CellStatus::Known, Some(old)) if *old == value => Ok(false),
            (CellStatus::Known, Some(old)) => Err(WriteConflict::NonMonotonic {
                old: old.clone(),
                new: value,
            }),
            (CellStatus::Known, None) => {
                Err(WriteConflict::PresenceContradiction { existing: None })
            }
        }
    }

    /// Assert absence. Same contract as [`assert_present`](Self::assert_present).
    pub fn assert_absent(&mut self) -> Result<bool, WriteConflict> {
        match (&self.status, &self.payload) {
            (CellStatus::Unknown, _) => {
                self.status = CellStatus::Known;
                self.payload = None;
                self.changed_this_round = true;
                Ok(true)
            }
            (CellStatus::Known, None) => Ok(false),
            (CellStatus::Known, Some(old)) => Err(WriteConflict::PresenceContradiction {
                existing: Some(old.clone()),
            }),
        }
    }

    /// `Ok(None)` is a known absence.
    pub fn read(&self) -> Result<Option<&Value>, Unresolved> {
        match self.status {
            CellStatus::Known => Ok(self.payload.as_ref()),
            CellStatus::Unknown => Err(Unresolved { cell: self.id }),
        }
    }

    pub fn reset(&mut self) {
        self.status = CellStatus::Unknown;
        self.payload = None;
        self.changed_this_round = false;
    }

    fn clear_round_mark(&mut self) {
        self.changed_this_round = false;
    }
}

/// Director-owned arena of cells indexed by [`CellId`].
#[derive(Debug, Default)]
pub struct CellTable {
    cells: Vec<SignalCell>,
    /// Number of cells currently known.
    known: usize,
}

impl CellTable {
    /// Create `len` unknown cells.
    pub fn with_len(len: usize) -> Self {
        Self {
            cells: (0..len).map(|i| SignalCell::new(CellId(i))).collect(),
            known: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn known_count(&self) -> usize {
        self.known
    }

    pub fn get(&self, id: CellId) -> Option<&SignalCell> {
        self.cells.get(id.0)
    }

    pub fn is_known(&self, id: CellId) -> bool {
        self.cells.get(id.0).is_some_and(SignalCell::is_known)
    }

    pub fn read(&self, id: CellId) -> Result<Option<&Value>, Unresolved> {
        self.cells.get(id.0).ok_or(Unresolved { cell: id })?.read()
    }

    /// Assert presence on a cell, counting the transition if it is new.
    ///
    /// Ids come from the network that sized this table, so an out-of-range
    /// id is treated as a no-op rather than a conflict.
    pub fn assert_present(&mut self, id: CellId, value: Value) -> Result<bool, WriteConflict> {
        let Some(cell) = self.cells.get_mut(id.0) else {
            return Ok(false);
        };
        let flipped = cell.assert_present(value)?;
        if flipped {
            self.known += 1;
        }
        Ok(flipped)
    }

    pub fn assert_absent(&mut self, id: CellId) -> Result<bool, WriteConflict> {
        let Some(cell) = self.cells.get_mut(id.0) else {
            return Ok(false);
        };
        let flipped = cell.assert_absent()?;
        if flipped {
            self.known += 1;
        }
        Ok(flipped)
    }

    /// Return every cell to unknown. Only called between instants.
    pub fn reset_all(&mut self) {
        for cell in &mut self.cells {
            cell.reset();
        }
        self.known = 0;
    }

    /// Clear the per-round change marks. Called at each round start.
    pub fn clear_round_marks(&mut self) {
        for cell in &mut self.cells {
            cell.clear_round_mark();
        }
    }

    /// Ids of every cell still unknown
    pub fn unknown_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_known())
            .map(|(i, _)| CellId(i))
    }

    /// Copy of every `(status, payload)` pair, in id order
    pub fn snapshot(&self) -> Vec<(CellStatus, Option<Value>)> {
        self.cells
            .iter()
            .map(|c| (c.status, c.payload.clone()))
            .collect()
    }
}
