//! Port dependency graph
//!
//! An edge `p -> q` means the value of `q` in an instant may depend on the
//! value of `p` in the same instant. The graph is produced by a
//! [`DependencyAnalyzer`] whenever the topology changes and consumed by the
//! [scheduler](crate::schedule).
//!
//! Cycles are not rejected here. [`topological_order`] condenses strongly
//! connected components and sorts the condensation with Kahn's algorithm,
//! reporting every cyclic component alongside the order.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};

use crate::config::TieBreak;
use crate::network::{Endpoint, Network};
use crate::types::PortId;

/// Directed graph over ports for one flattened network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: IndexSet<PortId>,
    edges: IndexMap<PortId, IndexSet<PortId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an edge list; nodes appear in first-mention order.
    pub fn from_edges(edges: impl IntoIterator<Item = (PortId, PortId)>) -> Self {
        let mut graph = Self::new();
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    pub fn add_node(&mut self, port: PortId) {
        self.nodes.insert(port);
    }

    pub fn add_edge(&mut self, from: PortId, to: PortId) {
        self.nodes.insert(from);
        self.nodes.insert(to);
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn contains(&self, port: PortId) -> bool {
        self.nodes.contains(&port)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = PortId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(IndexSet::len).sum()
    }

    pub fn successors(&self, port: PortId) -> impl Iterator<Item = PortId> + '_ {
        self.edges.get(&port).into_iter().flatten().copied()
    }

    pub fn has_self_loop(&self, port: PortId) -> bool {
        self.edges.get(&port).is_some_and(|s| s.contains(&port))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Computes the port dependency graph of a network.
pub trait DependencyAnalyzer {
    fn analyze(&self, network: &Network) -> DependencyGraph;
}

/// Conservative causality: every channel between two actor ports is an
/// edge, and within an actor every connected output depends on every
/// connected input.
///
/// Boundary endpoints are not nodes. An actor port attached only to the
/// boundary still is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCausality;

impl DependencyAnalyzer for DefaultCausality {
    fn analyze(&self, network: &Network) -> DependencyGraph {
        let mut graph = DependencyGraph::new();

        for actor in network.actor_ids() {
            let inputs: Vec<PortId> = network
                .input_ports(actor)
                .iter()
                .copied()
                .filter(|p| network.is_connected(*p))
                .collect();
            let outputs: Vec<PortId> = network
                .output_ports(actor)
                .iter()
                .copied()
                .filter(|p| network.is_connected(*p))
                .collect();

            for &port in inputs.iter().chain(&outputs) {
                graph.add_node(port);
            }
            for &input in &inputs {
                for &output in &outputs {
                    graph.add_edge(input, output);
                }
            }
        }

        for channel in network.channels() {
            if let (Endpoint::Port(from), Endpoint::Port(to)) = (&channel.producer, &channel.consumer) {
                graph.add_edge(*from, *to);
            }
        }

        graph
    }
}

/// Result of sorting a possibly cyclic graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologicalOrder {
    /// Every node, dependencies first. Members of one cyclic component are
    /// contiguous, in insertion order.
    pub order: Vec<PortId>,
    /// Components of size > 1, plus single nodes with a self-loop.
    pub cycles: Vec<Vec<PortId>>,
}

/// Sort ports so that every edge between different strongly connected
/// components points forward.
///
/// Ties among ready components are broken by their earliest node in
/// insertion order ([`TieBreak::Registration`]) or latest first
/// ([`TieBreak::Reverse`]), so the result is deterministic.
pub fn topological_order(graph: &DependencyGraph, tie_break: TieBreak) -> TopologicalOrder {
    if graph.is_empty() {
        return TopologicalOrder::default();
    }

    let succ = index_successors(graph);
    let components = strongly_connected(&succ);

    let mut component_of = vec![0usize; succ.len()];
    for (ci, members) in components.iter().enumerate() {
        for &v in members {
            component_of[v] = ci;
        }
    }

    // Build condensation with deduplicated edges
    let mut dependents: Vec<IndexSet<usize>> = vec![IndexSet::new(); components.len()];
    let mut in_degree = vec![0usize; components.len()];
    for (v, targets) in succ.iter().enumerate() {
        for &w in targets {
            let (a, b) = (component_of[v], component_of[w]);
            if a != b && dependents[a].insert(b) {
                in_degree[b] += 1;
            }
        }
    }

    // Members are sorted, so the first one is the earliest node.
    let key = |ci: usize| match tie_break {
        TieBreak::Registration => components[ci][0],
        TieBreak::Reverse => usize::MAX - components[ci][0],
    };

    let mut ready: BTreeSet<(usize, usize)> = (0..components.len())
        .filter(|&ci| in_degree[ci] == 0)
        .map(|ci| (key(ci), ci))
        .collect();

    let mut order = Vec::with_capacity(succ.len());
    while let Some((_, ci)) = ready.pop_first() {
        order.extend(components[ci].iter().map(|&v| node_at(graph, v)));
        for &next in &dependents[ci] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert((key(next), next));
            }
        }
    }

    let cycles = components
        .iter()
        .filter(|members| members.len() > 1 || succ[members[0]].contains(&members[0]))
        .map(|members| members.iter().map(|&v| node_at(graph, v)).collect())
        .collect();

    TopologicalOrder { order, cycles }
}

fn node_at(graph: &DependencyGraph, index: usize) -> PortId {
    graph.nodes[index]
}

/// Adjacency by node position
fn index_successors(graph: &DependencyGraph) -> Vec<Vec<usize>> {
    graph
        .nodes
        .iter()
        .map(|&p| {
            graph
                .successors(p)
                .filter_map(|q| graph.nodes.get_index_of(&q))
                .collect()
        })
        .collect()
}

/// Tarjan's algorithm without recursion. Each component's members are
/// returned sorted by position.
fn strongly_connected(succ: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = succ.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut next = 0usize;
    let mut components = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }

        index[root] = next;
        low[root] = next;
        next += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut call: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if frame.1 < succ[v].len() {
                let w = succ[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next;
                    low[w] = next;
                    next += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            call.pop();
            if let Some(&(parent, _)) = call.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == index[v] {
                let mut members = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    members.push(w);
                    if w == v {
                        break;
                    }
                }
                members.sort_unstable();
                components.push(members);
            }
        }
    }

    components
}
