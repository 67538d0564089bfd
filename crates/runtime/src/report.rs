//! Per-instant and per-run reports

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::Warning;
use crate::storage::CellStatus;
use crate::types::{CellId, Value};

/// Final state of one cell when its instant committed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellReport {
    pub cell: CellId,
    /// `producer -> consumer`
    pub channel: String,
    pub status: CellStatus,
    pub value: Option<Value>,
}

/// Outcome of one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstantReport {
    pub instant: u64,
    /// Rounds until convergence, including the final confirming round.
    pub rounds: usize,
    /// Number of `evaluate` calls
    pub firings: usize,
    pub known_cells: usize,
    pub total_cells: usize,
    /// Actors whose `commit` returned false in this instant
    pub newly_excluded: Vec<String>,
    /// Labels of channels still unknown at commit
    pub unresolved: Vec<String>,
    /// Known boundary outputs by label; `None` is absent.
    pub outputs: IndexMap<String, Option<Value>>,
    pub cells: Vec<CellReport>,
    pub warnings: Vec<Warning>,
}

impl InstantReport {
    /// Value of a boundary output: `None` if unknown, `Some(None)` if absent.
    pub fn output(&self, label: &str) -> Option<Option<&Value>> {
        self.outputs.get(label).map(Option::as_ref)
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.known_cells == self.total_cells
    }

    /// `(status, value)` of every cell, in cell order
    pub fn snapshot(&self) -> Vec<(CellStatus, Option<Value>)> {
        self.cells
            .iter()
            .map(|c| (c.status, c.value.clone()))
            .collect()
    }
}

/// Why [`Director::run`](crate::Director::run) stopped starting instants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    IterationsReached,
    AllExcluded,
    StopRequested,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::IterationsReached => "iteration limit reached",
            StopReason::AllExcluded => "every actor excluded",
            StopReason::StopRequested => "stop requested",
        };
        write!(f, "{text}")
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub instants: Vec<InstantReport>,
    pub total_firings: u64,
    pub stopped_reason: StopReason,
    /// Scheduling warnings for the final topology
    pub schedule_warnings: Vec<Warning>,
}
