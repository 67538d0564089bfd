//! Integration test harness for fixpoint networks.
//!
//! Wraps a [`Director`] so scenario tests can run instants and inspect the
//! resulting cells by channel instead of by index.

use std::sync::Once;

use fixpoint_runtime::actors::{FnActor, Seed};
use fixpoint_runtime::{
    CellStatus, Director, DirectorConfig, InstantReport, Network, PortSpec, Result, Value,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process. `RUST_LOG` overrides
/// the default filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fixpoint_runtime=warn".into()))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Test harness around an initialized director.
pub struct NetworkHarness {
    director: Director,
    reports: Vec<InstantReport>,
}

impl NetworkHarness {
    /// # Panics
    ///
    /// Panics if an actor fails to initialize.
    pub fn new(network: Network) -> Self {
        Self::with_config(network, DirectorConfig::default())
    }

    /// # Panics
    ///
    /// Panics if an actor fails to initialize.
    pub fn with_config(network: Network, config: DirectorConfig) -> Self {
        init_tracing();
        let mut director = Director::with_config(network, config);
        director.initialize().expect("initialize failed");
        Self {
            director,
            reports: Vec::new(),
        }
    }

    /// Run one instant and return its report.
    ///
    /// # Panics
    ///
    /// Panics if the instant fails.
    pub fn instant(&mut self) -> &InstantReport {
        let report = self.director.run_instant().expect("instant failed");
        self.reports.push(report);
        self.last()
    }

    /// Run one instant, keeping the report only on success.
    pub fn try_instant(&mut self) -> Result<&InstantReport> {
        let report = self.director.run_instant()?;
        self.reports.push(report);
        Ok(self.last())
    }

    pub fn run_instants(&mut self, count: u64) {
        for _ in 0..count {
            self.instant();
        }
    }

    /// Stage a boundary input for the next instant.
    ///
    /// # Panics
    ///
    /// Panics if `label` is not a boundary input.
    pub fn stage(&mut self, label: &str, value: Option<Value>) {
        self.director.stage_input(label, value).expect("unknown boundary input");
    }

    /// # Panics
    ///
    /// Panics if no instant has run yet.
    pub fn last(&self) -> &InstantReport {
        self.reports.last().expect("no instant has run")
    }

    pub fn reports(&self) -> &[InstantReport] {
        &self.reports
    }

    /// Boundary output of the last instant: `None` if unknown.
    pub fn output(&self, label: &str) -> Option<Option<&Value>> {
        self.last().output(label)
    }

    /// Final state of the channel between two `actor.port` paths in the last
    /// instant.
    ///
    /// # Panics
    ///
    /// Panics if there is no such channel.
    pub fn cell(&self, from: &str, to: &str) -> (CellStatus, Option<Value>) {
        let cell = self
            .director
            .network()
            .channel_between(from, to)
            .expect("no such channel");
        let report = &self.last().cells[cell.0];
        (report.status, report.value.clone())
    }

    pub fn director(&mut self) -> &mut Director {
        &mut self.director
    }
}

/// Known-present cell state
pub fn present(value: impl Into<Value>) -> (CellStatus, Option<Value>) {
    (CellStatus::Known, Some(value.into()))
}

/// Known-absent cell state
pub fn absent() -> (CellStatus, Option<Value>) {
    (CellStatus::Known, None)
}

pub fn unknown() -> (CellStatus, Option<Value>) {
    (CellStatus::Unknown, None)
}

/// One strict node of a generated acyclic network.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Producers, by index of an earlier node
    pub inputs: Vec<usize>,
    pub bias: i64,
    /// Outputs are absent when the sum is a multiple of this (if > 1).
    pub modulus: i64,
    /// Adds an input `fb` fed back from the last node through a non-strict
    /// [`Seed`] holding this value.
    pub seed: Option<i64>,
}

/// Description of a network that can be built repeatedly.
///
/// Node `i` is strict and sums `bias` and its present integer inputs. Nodes
/// are actors `0..nodes.len()`; seeded nodes then add one `Seed` actor each,
/// named `s<i>`, closing a loop from the last node. Without seeds the
/// network is acyclic. Nodes nobody reads are exposed as boundary outputs
/// named `n<i>`.
#[derive(Debug, Clone, Default)]
pub struct NetworkSpec {
    pub nodes: Vec<NodeSpec>,
}

impl NetworkSpec {
    /// Number of actors [`build`](Self::build) registers
    pub fn actor_count(&self) -> usize {
        self.nodes.len() + self.nodes.iter().filter(|n| n.seed.is_some()).count()
    }

    /// # Panics
    ///
    /// Panics if a node names a producer that is not an earlier node.
    pub fn build(&self) -> Network {
        let mut network = Network::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let mut ports = PortSpec::new();
            for k in 0..node.inputs.len() {
                ports = ports.input(format!("in{k}"));
            }
            if node.seed.is_some() {
                ports = ports.input("fb");
            }
            ports = ports.output("out");

            let arity = node.inputs.len() + usize::from(node.seed.is_some());
            let (bias, modulus) = (node.bias, node.modulus);
            let actor = FnActor::new(ports, move |firing| {
                let mut sum = bias;
                for k in 0..arity {
                    if let Some(x) = firing.read(k)?.and_then(|v| v.as_integer()) {
                        sum += x;
                    }
                }
                if modulus > 1 && sum.rem_euclid(modulus) == 0 {
                    firing.assert_absent(0)
                } else {
                    firing.assert_present(0, sum)
                }
            });
            network.add_actor(format!("n{i}"), actor).expect("add node");
        }

        let mut consumed = vec![false; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for (k, &producer) in node.inputs.iter().enumerate() {
                assert!(producer < i, "node {i} reads later node {producer}");
                consumed[producer] = true;
                network
                    .connect(&format!("n{producer}.out"), &format!("n{i}.in{k}"))
                    .expect("connect");
            }
        }
        let last = self.nodes.len().saturating_sub(1);
        for (i, node) in self.nodes.iter().enumerate() {
            let Some(value) = node.seed else {
                continue;
            };
            consumed[last] = true;
            network.add_actor(format!("s{i}"), Seed::new(value)).expect("add seed");
            network
                .connect(&format!("n{last}.out"), &format!("s{i}.in"))
                .expect("connect seed input");
            network
                .connect(&format!("s{i}.out"), &format!("n{i}.fb"))
                .expect("connect seed output");
        }
        for (i, used) in consumed.iter().enumerate() {
            if !used {
                network
                    .expose_output(&format!("n{i}.out"), format!("n{i}"))
                    .expect("expose");
            }
        }
        network
    }
}
