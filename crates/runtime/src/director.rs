//! Fixed-point director
//!
//! Drives a [`Network`] one instant at a time. Each instant walks through
//! [`Phase::Resetting`], [`Phase::Converging`], [`Phase::Committing`] and
//! [`Phase::Done`]:
//!
//! 1. every cell is reset to unknown and staged boundary inputs are asserted;
//! 2. rounds over the schedule prime and evaluate ready actors until neither
//!    the number of allowed actors nor the number of known cells changes;
//! 3. unfinished strict actors have their remaining outputs forced absent,
//!    then every allowed actor commits once, in schedule order.
//!
//! The director owns all cells. Actors only see the cells of their own ports
//! through [`Inputs`] and [`FiringContext`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::actor::{FiringContext, Inputs};
use crate::config::{DirectorConfig, UnresolvedPolicy};
use crate::dag::{DefaultCausality, DependencyAnalyzer};
use crate::error::{Error, Result, Warning};
use crate::network::{ActorWiring, Endpoint, Network, Wiring};
use crate::report::{CellReport, InstantReport, RunReport, StopReason};
use crate::schedule::{Schedule, Scheduler};
use crate::storage::CellTable;
use crate::types::{ActorId, CellId, Phase, Value};

/// Shared flag asking a running director not to start another instant.
///
/// An instant in progress always runs to convergence.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Actor bookkeeping for one instant, indexed by [`ActorId`].
#[derive(Debug)]
struct InstantState {
    /// `prime` returned true. Never reverts within an instant.
    allowed: Vec<bool>,
    allowed_count: usize,
    fired: Vec<bool>,
    finished: Vec<bool>,
    /// Known-input count at the previous evaluation of a non-strict actor
    last_known_inputs: Vec<Option<usize>>,
    firings: usize,
}

impl InstantState {
    fn new(actors: usize) -> Self {
        Self {
            allowed: vec![false; actors],
            allowed_count: 0,
            fired: vec![false; actors],
            finished: vec![false; actors],
            last_known_inputs: vec![None; actors],
            firings: 0,
        }
    }
}

/// The parts of a director one round needs, borrowed disjointly so actor
/// behaviors can be mutated while cells are read and written.
struct Pass<'a> {
    network: &'a mut Network,
    wiring: &'a Wiring,
    cells: &'a mut CellTable,
    excluded: &'a BTreeSet<ActorId>,
    check_invariants: bool,
    instant: u64,
}

impl Pass<'_> {
    fn visit(&mut self, actor: ActorId, state: &mut InstantState) -> Result<()> {
        if self.excluded.contains(&actor) {
            return Ok(());
        }
        let all_wiring = self.wiring;
        let Some(wiring) = all_wiring.actor(actor) else {
            return Ok(());
        };
        let a = actor.0;

        let known_before = input_view(actor, self.cells, wiring).known_count();
        let all_known_before = known_before == wiring.inputs.len();
        if !(wiring.non_strict || all_known_before) || state.finished[a] {
            return Ok(());
        }

        let behavior = self
            .network
            .behavior_mut(actor)
            .ok_or_else(|| Error::UnknownActor(actor.to_string()))?;

        if !state.allowed[a] {
            if !behavior.prime(&input_view(actor, self.cells, wiring))? {
                trace!(actor = %wiring.name, "prime declined");
                return Ok(());
            }
            state.allowed[a] = true;
            state.allowed_count += 1;
            trace!(actor = %wiring.name, "primed");
        } else if self.check_invariants && !behavior.prime(&input_view(actor, self.cells, wiring))? {
            error!(actor = %wiring.name, instant = self.instant, "prime retracted");
            return Err(Error::PrimeRetracted {
                actor: wiring.name.clone(),
                instant: self.instant,
            });
        }

        let mut firing = FiringContext {
            actor,
            name: &wiring.name,
            cells: &mut *self.cells,
            inputs: &wiring.inputs,
            outputs: &wiring.outputs,
            labels: &all_wiring.labels,
            reevaluate: false,
        };
        let mut stalled = false;
        match behavior.evaluate(&mut firing) {
            Ok(()) => {}
            Err(Error::Unresolved(unresolved)) => {
                trace!(actor = %wiring.name, cell = %unresolved.cell, "evaluation stopped at unknown input");
                stalled = true;
            }
            Err(e) => {
                error!(actor = %wiring.name, error = %e, "evaluation failed");
                return Err(e);
            }
        }
        let reevaluate = firing.reevaluate;
        state.fired[a] = true;
        state.firings += 1;

        // A strict actor that saw all its inputs and completed its evaluation
        // has defined every output it left silent as absent. A stalled one is
        // left unfinished until the end of the instant.
        if !wiring.non_strict && all_known_before && !stalled {
            force_absent(self.cells, wiring, &all_wiring.labels)?;
        }

        let outputs_known = wiring
            .outputs
            .iter()
            .flatten()
            .all(|c| self.cells.is_known(*c));
        state.finished[a] = if !wiring.non_strict {
            outputs_known
        } else if wiring.inputs.is_empty() {
            !reevaluate
        } else {
            all_known_before
                && outputs_known
                && state.last_known_inputs[a] == Some(known_before)
                && !reevaluate
        };
        if wiring.non_strict {
            state.last_known_inputs[a] = Some(known_before);
        }

        trace!(
            actor = %wiring.name,
            known_inputs = known_before,
            finished = state.finished[a],
            "evaluated"
        );
        Ok(())
    }
}

fn input_view<'a>(actor: ActorId, cells: &'a CellTable, wiring: &'a ActorWiring) -> Inputs<'a> {
    Inputs {
        actor,
        cells,
        inputs: &wiring.inputs,
    }
}

/// Assert absent every output cell of `wiring` that is still unknown.
fn force_absent(cells: &mut CellTable, wiring: &ActorWiring, labels: &[String]) -> Result<()> {
    for &cell in wiring.outputs.iter().flatten() {
        if !cells.is_known(cell) {
            cells
                .assert_absent(cell)
                .map_err(|c| Error::from_conflict(cell, label(labels, cell), wiring.name.clone(), c))?;
        }
    }
    Ok(())
}

fn label(labels: &[String], cell: CellId) -> String {
    labels.get(cell.0).cloned().unwrap_or_else(|| cell.to_string())
}

/// Executes a network under fixed-point semantics.
pub struct Director {
    network: Network,
    scheduler: Scheduler,
    config: DirectorConfig,
    wiring: Wiring,
    cells: CellTable,
    schedule_override: Option<Schedule>,
    instant: u64,
    phase: Phase,
    initialized: bool,
    /// Actors whose `commit` returned false. Cleared only by `initialize`.
    excluded: BTreeSet<ActorId>,
    staged: IndexMap<String, Option<Value>>,
    stop: StopHandle,
    fire_functional: Option<(u64, bool)>,
    total_firings: u64,
}

impl fmt::Debug for Director {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Director")
            .field("network", &self.network)
            .field("instant", &self.instant)
            .field("phase", &self.phase)
            .field("excluded", &self.excluded)
            .finish()
    }
}

impl Director {
    pub fn new(network: Network) -> Self {
        Self::with_config(network, DirectorConfig::default())
    }

    pub fn with_config(network: Network, config: DirectorConfig) -> Self {
        let wiring = network.wiring();
        let cells = CellTable::with_len(wiring.cell_count());
        info!(
            actors = network.actor_count(),
            cells = cells.len(),
            "director created"
        );
        Self {
            scheduler: Scheduler::new(Box::new(DefaultCausality), config.tie_break),
            network,
            config,
            wiring,
            cells,
            schedule_override: None,
            instant: 0,
            phase: Phase::Done,
            initialized: false,
            excluded: BTreeSet::new(),
            staged: IndexMap::new(),
            stop: StopHandle::default(),
            fire_functional: None,
            total_firings: 0,
        }
    }

    /// Replace the dependency analyzer used to build schedules.
    pub fn with_analyzer(mut self, analyzer: impl DependencyAnalyzer + 'static) -> Self {
        self.scheduler.set_analyzer(Box::new(analyzer));
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Mutable access to the network. Topology changes are picked up at the
    /// start of the next instant.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DirectorConfig) {
        self.scheduler.set_tie_break(config.tie_break);
        self.config = config;
    }

    /// Index of the next instant to run
    pub fn instant(&self) -> u64 {
        self.instant
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn excluded(&self) -> &BTreeSet<ActorId> {
        &self.excluded
    }

    pub fn is_excluded(&self, actor: ActorId) -> bool {
        self.excluded.contains(&actor)
    }

    pub fn total_firings(&self) -> u64 {
        self.total_firings
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Rebuild wiring and cells if the topology changed since the last call.
    fn refresh(&mut self) {
        if self.wiring.version == self.network.version() {
            return;
        }
        self.wiring = self.network.wiring();
        self.cells = CellTable::with_len(self.wiring.cell_count());
        if self.schedule_override.take().is_some() {
            debug!("schedule override dropped after topology change");
        }
        info!(
            version = self.wiring.version,
            actors = self.network.actor_count(),
            cells = self.cells.len(),
            "topology changed"
        );
    }

    /// The schedule the next instant will follow.
    pub fn schedule(&mut self) -> &Schedule {
        self.refresh();
        if let Some(schedule) = &self.schedule_override {
            return schedule;
        }
        self.scheduler.schedule(&self.network)
    }

    /// Follow `firings` instead of the computed schedule until the topology
    /// changes.
    pub fn override_schedule(&mut self, firings: Vec<ActorId>) -> Result<()> {
        self.refresh();
        if let Some(bad) = firings.iter().find(|a| a.0 >= self.network.actor_count()) {
            return Err(Error::UnknownActor(bad.to_string()));
        }
        debug!(firings = firings.len(), "schedule overridden");
        self.schedule_override = Some(Schedule::new(firings));
        Ok(())
    }

    pub fn clear_schedule_override(&mut self) {
        self.schedule_override = None;
    }

    /// True if every actor's evaluation depends on current inputs only.
    pub fn is_fire_functional(&mut self) -> bool {
        let version = self.network.version();
        if let Some((cached, value)) = self.fire_functional
            && cached == version
        {
            return value;
        }
        let value = self
            .network
            .actor_ids()
            .all(|a| self.network.behavior(a).is_some_and(|b| b.is_fire_functional()));
        self.fire_functional = Some((version, value));
        value
    }

    /// Stage a value for boundary input `label` for the next instant only.
    /// `None` stages an explicit absence.
    pub fn stage_input(&mut self, label: &str, value: Option<Value>) -> Result<()> {
        if !self.network.boundary_inputs().contains_key(label) {
            return Err(Error::UnknownPort(label.to_string()));
        }
        debug!(label, ?value, "input staged");
        self.staged.insert(label.to_string(), value);
        Ok(())
    }

    /// Prepare every actor for a run and clear exclusions.
    #[instrument(skip(self))]
    pub fn initialize(&mut self) -> Result<()> {
        self.refresh();
        let actors: Vec<ActorId> = self.network.actor_ids().collect();
        for actor in actors {
            if let Some(behavior) = self.network.behavior_mut(actor) {
                behavior.initialize()?;
            }
        }
        self.excluded.clear();
        self.instant = 0;
        self.total_firings = 0;
        self.phase = Phase::Done;
        self.initialized = true;
        info!(actors = self.network.actor_count(), cells = self.cells.len(), "director initialized");
        Ok(())
    }

    /// Let every actor release its resources.
    #[instrument(skip(self))]
    pub fn wrapup(&mut self) -> Result<()> {
        let actors: Vec<ActorId> = self.network.actor_ids().collect();
        for actor in actors {
            if let Some(behavior) = self.network.behavior_mut(actor) {
                behavior.wrapup()?;
            }
        }
        self.initialized = false;
        info!(instants = self.instant, firings = self.total_firings, "director wrapped up");
        Ok(())
    }

    /// Execute one instant to its fixed point and commit it.
    ///
    /// Fatal errors leave the instant uncommitted: no actor's `commit` is
    /// called and the instant counter does not advance.
    #[instrument(skip(self), fields(instant = self.instant))]
    pub fn run_instant(&mut self) -> Result<InstantReport> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        let firings = self.schedule().firings().to_vec();
        let commit_order = distinct(&firings);

        self.phase = Phase::Resetting;
        self.cells.reset_all();
        self.apply_staged_inputs()?;
        let mut state = InstantState::new(self.network.actor_count());

        self.phase = Phase::Converging;
        let rounds = self.converge(&firings, &mut state)?;

        self.phase = Phase::Committing;
        // Strict actors whose evaluation kept stalling get the end-of-instant
        // default.
        for &actor in &commit_order {
            let a = actor.0;
            if !state.allowed[a] || state.finished[a] || self.excluded.contains(&actor) {
                continue;
            }
            if let Some(wiring) = self.wiring.actor(actor)
                && !wiring.non_strict
            {
                force_absent(&mut self.cells, wiring, &self.wiring.labels)?;
            }
        }
        let (unresolved, warnings) = self.check_unresolved()?;
        let outputs = self.boundary_outputs();
        let cells = self.cell_reports();
        let newly_excluded = self.commit(&commit_order, &state)?;

        let report = InstantReport {
            instant: self.instant,
            rounds,
            firings: state.firings,
            known_cells: self.cells.known_count(),
            total_cells: self.cells.len(),
            newly_excluded,
            unresolved,
            outputs,
            cells,
            warnings,
        };

        self.cells.reset_all();
        self.phase = Phase::Done;
        self.instant += 1;
        self.total_firings += state.firings as u64;
        debug!(
            rounds,
            fired_actors = state.fired.iter().filter(|f| **f).count(),
            firings = report.firings,
            known = report.known_cells,
            total = report.total_cells,
            "instant complete"
        );
        Ok(report)
    }

    /// Initialize, run instants until a stop criterion holds, then wrap up.
    #[instrument(skip(self), fields(iterations = self.config.iterations))]
    pub fn run(&mut self) -> Result<RunReport> {
        self.initialize()?;
        let mut instants = Vec::new();

        let stopped_reason = loop {
            if self.stop.is_stop_requested() {
                break StopReason::StopRequested;
            }
            if self.config.iterations > 0 && instants.len() as u64 >= self.config.iterations {
                break StopReason::IterationsReached;
            }
            if self.network.actor_ids().all(|a| self.excluded.contains(&a)) {
                break StopReason::AllExcluded;
            }
            match self.run_instant() {
                Ok(report) => instants.push(report),
                Err(e) => {
                    if let Err(wrapup) = self.wrapup() {
                        warn!(error = %wrapup, "wrapup after failed instant also failed");
                    }
                    return Err(e);
                }
            }
        };

        self.wrapup()?;
        info!(instants = instants.len(), reason = %stopped_reason, "run finished");
        Ok(RunReport {
            instants,
            total_firings: self.total_firings,
            stopped_reason,
            schedule_warnings: self.schedule().warnings().to_vec(),
        })
    }

    fn apply_staged_inputs(&mut self) -> Result<()> {
        let mut staged = std::mem::take(&mut self.staged);
        for (name, &cell) in self.network.boundary_inputs() {
            let written = match staged.swap_remove(name).flatten() {
                Some(value) => self.cells.assert_present(cell, value),
                None => self.cells.assert_absent(cell),
            };
            written.map_err(|c| Error::from_conflict(cell, label(&self.wiring.labels, cell), name.clone(), c))?;
        }
        Ok(())
    }

    fn converge(&mut self, firings: &[ActorId], state: &mut InstantState) -> Result<usize> {
        // Round 1 only sets the baseline.
        let bound = self.network.actor_count() + self.cells.len() + 2;
        let instant = self.instant;
        let mut pass = Pass {
            network: &mut self.network,
            wiring: &self.wiring,
            cells: &mut self.cells,
            excluded: &self.excluded,
            check_invariants: self.config.check_invariants,
            instant,
        };

        // No baseline before round 1, so at least two rounds always run.
        let mut previous: Option<(usize, usize)> = None;
        let mut rounds = 0;
        loop {
            if rounds == bound {
                error!(bound, "convergence bound exceeded");
                return Err(Error::ConvergenceBoundExceeded { instant, bound });
            }
            rounds += 1;
            if rounds > 1 {
                pass.cells.clear_round_marks();
            }

            for &actor in firings {
                pass.visit(actor, state)?;
            }

            let current = (state.allowed_count, pass.cells.known_count());
            trace!(round = rounds, allowed = current.0, known = current.1, "round complete");
            if previous == Some(current) {
                return Ok(rounds);
            }
            previous = Some(current);
        }
    }

    fn check_unresolved(&self) -> Result<(Vec<String>, Vec<Warning>)> {
        let unknown: Vec<CellId> = self.cells.unknown_cells().collect();
        let channels: Vec<String> = unknown.iter().map(|c| label(&self.wiring.labels, *c)).collect();
        let mut warnings = Vec::new();
        if channels.is_empty() {
            return Ok((channels, warnings));
        }

        match self.config.unresolved {
            UnresolvedPolicy::Allow => {
                debug!(count = channels.len(), "cells unknown at commit");
            }
            UnresolvedPolicy::Warn => {
                warn!(channels = ?channels, "cells unknown at commit");
                warnings.push(Warning::UnresolvedSignals {
                    instant: self.instant,
                    channels: channels.clone(),
                });
            }
            UnresolvedPolicy::Reject => {
                let mut actors: Vec<String> = Vec::new();
                for cell in &unknown {
                    if let Some(channel) = self.network.channel(*cell)
                        && let Endpoint::Port(port) = channel.consumer
                        && let Some(info) = self.network.port_info(port)
                    {
                        let name = self.network.actor_name(info.actor).to_string();
                        if !actors.contains(&name) {
                            actors.push(name);
                        }
                    }
                }
                error!(actors = ?actors, "unknown inputs remain");
                return Err(Error::CausalityLoop {
                    instant: self.instant,
                    actors,
                });
            }
        }
        Ok((channels, warnings))
    }

    fn boundary_outputs(&self) -> IndexMap<String, Option<Value>> {
        let mut outputs = IndexMap::new();
        for (label, &cell) in self.network.boundary_outputs() {
            if let Ok(value) = self.cells.read(cell) {
                outputs.insert(label.clone(), value.cloned());
            }
        }
        outputs
    }

    fn cell_reports(&self) -> Vec<CellReport> {
        self.cells
            .snapshot()
            .into_iter()
            .enumerate()
            .map(|(i, (status, value))| CellReport {
                cell: CellId(i),
                channel: label(&self.wiring.labels, CellId(i)),
                status,
                value,
            })
            .collect()
    }

    /// Commit every allowed actor once; returns the names of actors excluded
    /// by this commit.
    fn commit(&mut self, order: &[ActorId], state: &InstantState) -> Result<Vec<String>> {
        let mut newly_excluded = Vec::new();
        for &actor in order {
            if !state.allowed[actor.0] || self.excluded.contains(&actor) {
                continue;
            }
            let Some(wiring) = self.wiring.actor(actor) else {
                continue;
            };
            let Some(behavior) = self.network.behavior_mut(actor) else {
                continue;
            };
            if !behavior.commit(&input_view(actor, &self.cells, wiring))? {
                info!(actor = %wiring.name, "actor excluded from later instants");
                self.excluded.insert(actor);
                newly_excluded.push(wiring.name.clone());
            }
        }
        Ok(newly_excluded)
    }
}

fn distinct(firings: &[ActorId]) -> Vec<ActorId> {
    let mut seen = BTreeSet::new();
    firings.iter().copied().filter(|a| seen.insert(*a)).collect()
}
