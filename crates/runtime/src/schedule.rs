//! Static scheduling
//!
//! Turns the port dependency graph into an ordered list of actor firings.
//! The order only affects how many rounds an instant takes, never the fixed
//! point it reaches, so any topological order is acceptable. Zero-delay
//! cycles are reported as [`Warning::CyclicDependency`] unless a non-strict
//! actor sits on the cycle.

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use crate::config::TieBreak;
use crate::dag::{DependencyAnalyzer, DependencyGraph, topological_order};
use crate::error::Warning;
use crate::network::Network;
use crate::types::{ActorId, PortDirection};

/// Ordered actor firings for one topology version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    firings: Vec<ActorId>,
    warnings: Vec<Warning>,
    version: u64,
}

impl Schedule {
    /// A hand-built schedule, mostly useful for exercising alternative orders.
    pub fn new(firings: Vec<ActorId>) -> Self {
        Self {
            firings,
            warnings: Vec::new(),
            version: 0,
        }
    }

    pub fn firings(&self) -> &[ActorId] {
        &self.firings
    }

    pub fn len(&self) -> usize {
        self.firings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.firings.is_empty()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Topology version this schedule was built for
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Each actor once, in first-firing order.
    pub fn distinct_actors(&self) -> Vec<ActorId> {
        let mut seen = BTreeSet::new();
        self.firings
            .iter()
            .copied()
            .filter(|a| seen.insert(*a))
            .collect()
    }
}

/// Builds schedules and caches the last one by topology version.
pub struct Scheduler {
    analyzer: Box<dyn DependencyAnalyzer>,
    tie_break: TieBreak,
    cached: Option<Schedule>,
}

impl Scheduler {
    pub fn new(analyzer: Box<dyn DependencyAnalyzer>, tie_break: TieBreak) -> Self {
        Self {
            analyzer,
            tie_break,
            cached: None,
        }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn set_tie_break(&mut self, tie_break: TieBreak) {
        if self.tie_break != tie_break {
            self.tie_break = tie_break;
            self.cached = None;
        }
    }

    pub fn set_analyzer(&mut self, analyzer: Box<dyn DependencyAnalyzer>) {
        self.analyzer = analyzer;
        self.cached = None;
    }

    /// True if the cached schedule matches the network's topology.
    pub fn is_current(&self, network: &Network) -> bool {
        self.cached
            .as_ref()
            .is_some_and(|s| s.version == network.version())
    }

    /// Schedule for the network, rebuilt only when its topology changed.
    pub fn schedule(&mut self, network: &Network) -> &Schedule {
        if !self.is_current(network) {
            let graph = self.analyzer.analyze(network);
            self.cached = Some(build_schedule(network, &graph, self.tie_break));
        }
        self.cached.get_or_insert_with(Schedule::default)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tie_break", &self.tie_break)
            .field("cached", &self.cached.as_ref().map(|s| s.version))
            .finish()
    }
}

/// Order actor firings from a port dependency graph.
///
/// Ports are sorted topologically and mapped to their owning actor; an actor
/// is appended only when it differs from the previous entry. Unconnected
/// input ports are skipped. Actors with no port in the graph cannot depend
/// on anything and are placed first.
#[instrument(skip_all, fields(version = network.version(), nodes = graph.node_count()))]
pub fn build_schedule(network: &Network, graph: &DependencyGraph, tie_break: TieBreak) -> Schedule {
    let sorted = topological_order(graph, tie_break);

    let mut ordered: Vec<ActorId> = Vec::with_capacity(sorted.order.len());
    for &port in &sorted.order {
        let Some(info) = network.port_info(port) else {
            continue;
        };
        if info.direction == PortDirection::Input && !network.is_connected(port) {
            continue;
        }
        if ordered.last() != Some(&info.actor) {
            ordered.push(info.actor);
        }
    }

    let placed: BTreeSet<ActorId> = ordered.iter().copied().collect();
    let mut isolated: Vec<ActorId> = network.actor_ids().filter(|a| !placed.contains(a)).collect();
    if tie_break == TieBreak::Reverse {
        isolated.reverse();
    }

    let mut firings = isolated;
    firings.extend(ordered);

    let mut warnings = Vec::new();
    for cycle in &sorted.cycles {
        let mut actors: Vec<ActorId> = Vec::new();
        for &port in cycle {
            if let Some(info) = network.port_info(port)
                && !actors.contains(&info.actor)
            {
                actors.push(info.actor);
            }
        }

        let names: Vec<String> = actors
            .iter()
            .map(|a| network.actor_name(*a).to_string())
            .collect();

        if actors.iter().any(|a| network.is_non_strict(*a)) {
            debug!(actors = ?names, "cycle broken by non-strict actor");
            continue;
        }

        warn!(actors = ?names, "zero-delay cycle with no non-strict actor");
        warnings.push(Warning::CyclicDependency { actors, names });
    }

    debug!(firings = firings.len(), cycles = sorted.cycles.len(), "schedule built");
    Schedule {
        firings,
        warnings,
        version: network.version(),
    }
}
