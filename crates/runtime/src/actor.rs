//! Actor capability and firing contexts
//!
//! The director drives actors through three operations per instant:
//! [`Actor::prime`] (may this actor fire?), [`Actor::evaluate`] (possibly
//! several times) and [`Actor::commit`] (exactly once, after convergence).
//!
//! Actors never hold references to cells. They see their own inputs through
//! [`Inputs`] and write their own outputs through [`FiringContext`], both addressed
//! by local port index in declaration order.

use crate::error::{Error, Result};
use crate::storage::{CellTable, WriteConflict};
use crate::types::{ActorId, CellId, PortDirection, Value};

/// Port names an actor declares, in local index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSpec {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl PortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }
}

/// A unit of computation in a synchronous network.
///
/// Strict actors (the default) are only primed and evaluated once all their
/// inputs are known. Non-strict actors may be evaluated with unknown inputs
/// and must then be monotonic: never retract a `prime` and never change an
/// output they already asserted within the instant.
pub trait Actor {
    /// Declared ports. Queried once when the actor is registered.
    fn ports(&self) -> PortSpec;

    /// Queried once when the actor is registered.
    fn is_non_strict(&self) -> bool {
        false
    }

    /// True if `evaluate` is a function of the current inputs only.
    fn is_fire_functional(&self) -> bool {
        true
    }

    /// Called once before the first instant.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether the actor may fire in this instant.
    fn prime(&mut self, _inputs: &Inputs<'_>) -> Result<bool> {
        Ok(true)
    }

    /// Compute outputs from inputs. May be called repeatedly in one instant.
    fn evaluate(&mut self, firing: &mut FiringContext<'_>) -> Result<()>;

    /// Update state after the fixed point is reached. Returning false
    /// excludes the actor from every later instant.
    fn commit(&mut self, _inputs: &Inputs<'_>) -> Result<bool> {
        Ok(true)
    }

    /// Called once after the last instant.
    fn wrapup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read-only view of one actor's input cells.
///
/// An unconnected input reads as known-absent.
pub struct Inputs<'a> {
    pub(crate) actor: ActorId,
    pub(crate) cells: &'a CellTable,
    pub(crate) inputs: &'a [Option<CellId>],
}

impl<'a> Inputs<'a> {
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    fn slot(&self, index: usize) -> Result<Option<CellId>> {
        self.inputs
            .get(index)
            .copied()
            .ok_or(Error::PortOutOfRange {
                actor: self.actor,
                direction: PortDirection::Input,
                index,
            })
    }

    /// Read input `index`: `Ok(None)` is absent, [`Error::Unresolved`] means
    /// the status is not known yet.
    pub fn read(&self, index: usize) -> Result<Option<&'a Value>> {
        match self.slot(index)? {
            Some(cell) => Ok(self.cells.read(cell)?),
            None => Ok(None),
        }
    }

    /// Out-of-range indices read as not known.
    pub fn is_known(&self, index: usize) -> bool {
        match self.inputs.get(index) {
            Some(Some(cell)) => self.cells.is_known(*cell),
            Some(None) => true,
            None => false,
        }
    }

    /// True if input `index` became known during the current round.
    pub fn is_fresh(&self, index: usize) -> bool {
        match self.inputs.get(index) {
            Some(Some(cell)) => self
                .cells
                .get(*cell)
                .is_some_and(|c| c.changed_this_round()),
            _ => false,
        }
    }

    pub fn all_known(&self) -> bool {
        (0..self.inputs.len()).all(|i| self.is_known(i))
    }

    pub fn known_count(&self) -> usize {
        (0..self.inputs.len()).filter(|&i| self.is_known(i)).count()
    }
}

/// Read-write context for one [`Actor::evaluate`] call.
pub struct FiringContext<'a> {
    pub(crate) actor: ActorId,
    pub(crate) name: &'a str,
    pub(crate) cells: &'a mut CellTable,
    pub(crate) inputs: &'a [Option<CellId>],
    pub(crate) outputs: &'a [Vec<CellId>],
    pub(crate) labels: &'a [String],
    pub(crate) reevaluate: bool,
}

impl<'a> FiringContext<'a> {
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn inputs(&self) -> Inputs<'_> {
        Inputs {
            actor: self.actor,
            cells: self.cells,
            inputs: self.inputs,
        }
    }

    /// Shorthand for `self.inputs().read(index)` with an owned result.
    pub fn read(&self, index: usize) -> Result<Option<Value>> {
        Ok(self.inputs().read(index)?.cloned())
    }

    pub fn is_known(&self, index: usize) -> bool {
        self.inputs().is_known(index)
    }

    pub fn is_fresh(&self, index: usize) -> bool {
        self.inputs().is_fresh(index)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    fn output_cells(&self, index: usize) -> Result<&'a [CellId]> {
        self.outputs
            .get(index)
            .map(Vec::as_slice)
            .ok_or(Error::PortOutOfRange {
                actor: self.actor,
                direction: PortDirection::Output,
                index,
            })
    }

    /// True once every channel fed by output `index` is known. An output
    /// with no channels is trivially known.
    pub fn is_output_known(&self, index: usize) -> bool {
        match self.outputs.get(index) {
            Some(cells) => cells.iter().all(|c| self.cells.is_known(*c)),
            None => false,
        }
    }

    /// Assert output `index` present with `value` on every channel it feeds.
    pub fn assert_present(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        for &cell in self.output_cells(index)? {
            self.cells
                .assert_present(cell, value.clone())
                .map_err(|conflict| self.conflict(cell, conflict))?;
        }
        Ok(())
    }

    /// Assert output `index` absent on every channel it feeds.
    pub fn assert_absent(&mut self, index: usize) -> Result<()> {
        for &cell in self.output_cells(index)? {
            self.cells
                .assert_absent(cell)
                .map_err(|conflict| self.conflict(cell, conflict))?;
        }
        Ok(())
    }

    /// Present if `value` is `Some`, absent otherwise.
    pub fn assert_option(&mut self, index: usize, value: Option<Value>) -> Result<()> {
        match value {
            Some(v) => self.assert_present(index, v),
            None => self.assert_absent(index),
        }
    }

    /// Keep this (non-strict) actor unfinished after the current evaluation
    /// so it is evaluated again in the next round.
    pub fn request_reevaluation(&mut self) {
        self.reevaluate = true;
    }

    fn conflict(&self, cell: CellId, conflict: WriteConflict) -> Error {
        let channel = self
            .labels
            .get(cell.0)
            .cloned()
            .unwrap_or_else(|| cell.to_string());
        Error::from_conflict(cell, channel, self.name.to_string(), conflict)
    }
}
