//! Runtime errors for fixed-point execution.
//!
//! # Error Categories
//!
//! - **Model errors**: [`Error::NonMonotonicWrite`], [`Error::PresenceContradiction`].
//!   The network violates the determinism contract; always fatal for the run.
//! - **Internal-consistency errors**: [`Error::ConvergenceBoundExceeded`],
//!   [`Error::PrimeRetracted`]. A broken invariant, never a recoverable state.
//! - **Construction errors**: unknown or misused actors and ports.
//! - **Actor errors**: an actor's own evaluation failure.
//!
//! Topology problems such as cyclic dependencies are not errors; they are
//! reported as [`Warning`]s and execution continues.

use serde::Serialize;
use thiserror::Error;

use crate::storage::WriteConflict;
use crate::types::{ActorId, CellId, PortDirection, Value};

/// Runtime result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or executing a network.
#[derive(Debug, Error)]
pub enum Error {
    /// A cell that already holds a present value was asserted with a
    /// different value in the same instant.
    #[error("non-monotonic write on {channel} ({cell}) by '{actor}': {old} then {new}")]
    NonMonotonicWrite {
        cell: CellId,
        /// `producer -> consumer` label of the channel.
        channel: String,
        actor: String,
        old: Value,
        new: Value,
    },

    /// A cell was asserted present after being asserted absent, or the
    /// other way around.
    #[error("presence contradiction on {channel} ({cell}) by '{actor}': already {}", describe(.existing))]
    PresenceContradiction {
        cell: CellId,
        channel: String,
        actor: String,
        /// What the cell held before the contradicting assertion.
        existing: Option<Value>,
    },

    /// The round loop ran past `#actors + #cells + 1` rounds after the
    /// baseline round.
    ///
    /// The monotone-lattice argument bounds the number of productive rounds,
    /// so reaching this is an implementation bug.
    #[error("instant {instant} did not converge within {bound} rounds")]
    ConvergenceBoundExceeded { instant: u64, bound: usize },

    /// An actor's `prime` returned false after returning true in the same
    /// instant.
    #[error("actor '{actor}' retracted prime in instant {instant}")]
    PrimeRetracted { actor: String, instant: u64 },

    /// Cells were still unknown at commit and the configuration rejects that.
    #[error("unknown inputs remain in instant {instant}; possible causality loop through {actors:?}")]
    CausalityLoop { instant: u64, actors: Vec<String> },

    /// An actor propagated an unresolved read.
    #[error(transparent)]
    Unresolved(#[from] Unresolved),

    /// An actor failed for its own reasons.
    #[error("actor '{actor}' failed: {message}")]
    Actor { actor: String, message: String },

    #[error("unknown actor: {0}")]
    UnknownActor(String),

    #[error("unknown port: {0}")]
    UnknownPort(String),

    #[error("actor '{0}' is already registered")]
    DuplicateActor(String),

    #[error("actor '{actor}' declares port '{port}' twice")]
    DuplicatePort { actor: String, port: String },

    #[error("port '{port}' is an {actual} port, expected {expected}")]
    PortDirection {
        port: String,
        expected: PortDirection,
        actual: PortDirection,
    },

    /// Networks must have exactly one producer per cell.
    #[error("input '{port}' already has a producer")]
    MultipleProducers { port: String },

    #[error("boundary '{0}' is already declared")]
    DuplicateBoundary(String),

    /// An actor addressed a local port index it does not own.
    #[error("{actor} has no {direction} port at index {index}")]
    PortOutOfRange {
        actor: ActorId,
        direction: PortDirection,
        index: usize,
    },

    #[error("director has not been initialized")]
    NotInitialized,
}

impl Error {
    /// Build an [`Error::Actor`] from any displayable message.
    pub fn actor(actor: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Actor {
            actor: actor.into(),
            message: message.to_string(),
        }
    }

    /// Attach channel and writer identification to a rejected cell write.
    pub(crate) fn from_conflict(cell: CellId, channel: String, actor: String, conflict: WriteConflict) -> Self {
        match conflict {
            WriteConflict::NonMonotonic { old, new } => Error::NonMonotonicWrite {
                cell,
                channel,
                actor,
                old,
                new,
            },
            WriteConflict::PresenceContradiction { existing } => Error::PresenceContradiction {
                cell,
                channel,
                actor,
                existing,
            },
        }
    }

    /// True for errors caused by an ill-formed or non-monotonic network.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            Error::NonMonotonicWrite { .. } | Error::PresenceContradiction { .. }
        )
    }

    /// True for errors that indicate a broken internal invariant.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::ConvergenceBoundExceeded { .. } | Error::PrimeRetracted { .. }
        )
    }
}

fn describe(existing: &Option<Value>) -> String {
    match existing {
        Some(v) => format!("present({v})"),
        None => "absent".to_string(),
    }
}

/// A read of a cell whose status is still unknown.
///
/// This is the expected "not ready yet" outcome, distinct from the fatal
/// [`Error`] kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{cell} is unresolved")]
pub struct Unresolved {
    pub cell: CellId,
}

/// Non-fatal diagnostics produced while scheduling or converging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Warning {
    /// A zero-delay cycle that no non-strict actor breaks.
    ///
    /// Signals on the cycle may stay unknown for every instant.
    CyclicDependency {
        actors: Vec<ActorId>,
        names: Vec<String>,
    },
    /// Cells left unknown after convergence (only under
    /// `UnresolvedPolicy::Warn`).
    UnresolvedSignals { instant: u64, channels: Vec<String> },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::CyclicDependency { names, .. } => {
                write!(f, "cyclic dependency through {}", names.join(", "))
            }
            Warning::UnresolvedSignals { instant, channels } => write!(
                f,
                "instant {instant} left {} channel(s) unknown: {}",
                channels.len(),
                channels.join(", ")
            ),
        }
    }
}
