//! Actor network
//!
//! Registers actors and their ports and records channels between them. Each
//! channel becomes exactly one signal cell; [`CellId`]s are channel indices.
//!
//! Any mutation bumps [`Network::version`], which the director uses to know
//! when its schedule and wiring are stale.

use std::fmt;

use indexmap::IndexMap;
use tracing::debug;

use crate::actor::Actor;
use crate::error::{Error, Result};
use crate::types::{ActorId, CellId, PortDirection, PortId};

/// A registered port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub actor: ActorId,
    pub name: String,
    pub direction: PortDirection,
    /// Position among the actor's ports of the same direction.
    pub index: usize,
}

/// One end of a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Port(PortId),
    /// The environment outside the network, named by a label.
    Boundary(String),
}

/// A producer-to-consumer connection carrying one signal per instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub producer: Endpoint,
    pub consumer: Endpoint,
}

struct ActorSlot {
    name: String,
    inputs: Vec<PortId>,
    outputs: Vec<PortId>,
    non_strict: bool,
    behavior: Box<dyn Actor>,
}

/// A flat network of actors connected by channels.
#[derive(Default)]
pub struct Network {
    actors: Vec<ActorSlot>,
    ports: Vec<PortInfo>,
    /// Cells fed (outputs) or read (inputs) by each port
    port_cells: Vec<Vec<CellId>>,
    channels: Vec<Channel>,
    by_name: IndexMap<String, ActorId>,
    boundary_inputs: IndexMap<String, CellId>,
    boundary_outputs: IndexMap<String, CellId>,
    version: u64,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("actors", &self.by_name.keys().collect::<Vec<_>>())
            .field("channels", &self.channels.len())
            .field("version", &self.version)
            .finish()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor under a unique name.
    pub fn add_actor(&mut self, name: impl Into<String>, actor: impl Actor + 'static) -> Result<ActorId> {
        self.add_boxed(name, Box::new(actor))
    }

    pub fn add_boxed(&mut self, name: impl Into<String>, behavior: Box<dyn Actor>) -> Result<ActorId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateActor(name));
        }

        let id = ActorId(self.actors.len());
        let spec = behavior.ports();
        let all: Vec<&String> = spec.inputs.iter().chain(&spec.outputs).collect();
        for (i, port) in all.iter().enumerate() {
            if all[i + 1..].contains(port) {
                return Err(Error::DuplicatePort {
                    actor: name,
                    port: (*port).clone(),
                });
            }
        }

        // Ports are numbered inputs first, then outputs, contiguously.
        let first = self.ports.len();
        for (index, port) in spec.inputs.iter().enumerate() {
            self.push_port(id, port, PortDirection::Input, index);
        }
        let split = self.ports.len();
        for (index, port) in spec.outputs.iter().enumerate() {
            self.push_port(id, port, PortDirection::Output, index);
        }
        let inputs: Vec<PortId> = (first..split).map(PortId).collect();
        let outputs: Vec<PortId> = (split..self.ports.len()).map(PortId).collect();

        let non_strict = behavior.is_non_strict();
        debug!(actor = %name, %id, inputs = inputs.len(), outputs = outputs.len(), non_strict, "actor registered");

        self.by_name.insert(name.clone(), id);
        self.actors.push(ActorSlot {
            name,
            inputs,
            outputs,
            non_strict,
            behavior,
        });
        self.version += 1;
        Ok(id)
    }

    fn push_port(&mut self, actor: ActorId, name: &str, direction: PortDirection, index: usize) {
        self.ports.push(PortInfo {
            actor,
            name: name.to_string(),
            direction,
            index,
        });
        self.port_cells.push(Vec::new());
    }

    /// Connect an output port to an input port, both given as `actor.port`.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<CellId> {
        let producer = self.port_expecting(from, PortDirection::Output)?;
        let consumer = self.port_expecting(to, PortDirection::Input)?;
        self.connect_ports(producer, consumer)
    }

    pub fn connect_ports(&mut self, producer: PortId, consumer: PortId) -> Result<CellId> {
        self.check_direction(producer, PortDirection::Output)?;
        self.check_direction(consumer, PortDirection::Input)?;
        self.check_free_input(consumer)?;
        let cell = self.push_channel(Endpoint::Port(producer), Endpoint::Port(consumer));
        self.port_cells[producer.0].push(cell);
        self.port_cells[consumer.0].push(cell);
        debug!(channel = %self.channel_label(cell), %cell, "channel connected");
        Ok(cell)
    }

    /// Make output `from` (`actor.port`) observable by the environment
    /// under `label`.
    pub fn expose_output(&mut self, from: &str, label: impl Into<String>) -> Result<CellId> {
        let label = label.into();
        if self.boundary_outputs.contains_key(&label) {
            return Err(Error::DuplicateBoundary(label));
        }
        let producer = self.port_expecting(from, PortDirection::Output)?;
        let cell = self.push_channel(Endpoint::Port(producer), Endpoint::Boundary(label.clone()));
        self.port_cells[producer.0].push(cell);
        self.boundary_outputs.insert(label, cell);
        Ok(cell)
    }

    /// Let the environment drive input `to` (`actor.port`) under `label`.
    pub fn expose_input(&mut self, label: impl Into<String>, to: &str) -> Result<CellId> {
        let label = label.into();
        if self.boundary_inputs.contains_key(&label) {
            return Err(Error::DuplicateBoundary(label));
        }
        let consumer = self.port_expecting(to, PortDirection::Input)?;
        self.check_free_input(consumer)?;
        let cell = self.push_channel(Endpoint::Boundary(label.clone()), Endpoint::Port(consumer));
        self.port_cells[consumer.0].push(cell);
        self.boundary_inputs.insert(label, cell);
        Ok(cell)
    }

    fn push_channel(&mut self, producer: Endpoint, consumer: Endpoint) -> CellId {
        let cell = CellId(self.channels.len());
        self.channels.push(Channel { producer, consumer });
        self.version += 1;
        cell
    }

    fn check_free_input(&self, port: PortId) -> Result<()> {
        if self.port_cells[port.0].is_empty() {
            Ok(())
        } else {
            Err(Error::MultipleProducers {
                port: self.port_path(port),
            })
        }
    }

    fn check_direction(&self, port: PortId, expected: PortDirection) -> Result<()> {
        let info = self
            .ports
            .get(port.0)
            .ok_or_else(|| Error::UnknownPort(port.to_string()))?;
        if info.direction != expected {
            return Err(Error::PortDirection {
                port: self.port_path(port),
                expected,
                actual: info.direction,
            });
        }
        Ok(())
    }

    fn port_expecting(&self, path: &str, expected: PortDirection) -> Result<PortId> {
        let port = self.port(path)?;
        self.check_direction(port, expected)?;
        Ok(port)
    }

    /// Resolve an `actor.port` path.
    pub fn port(&self, path: &str) -> Result<PortId> {
        let (actor, port) = path
            .rsplit_once('.')
            .ok_or_else(|| Error::UnknownPort(path.to_string()))?;
        let id = self.actor_id(actor)?;
        let slot = &self.actors[id.0];
        slot.inputs
            .iter()
            .chain(&slot.outputs)
            .copied()
            .find(|p| self.ports[p.0].name == port)
            .ok_or_else(|| Error::UnknownPort(path.to_string()))
    }

    pub fn actor_id(&self, name: &str) -> Result<ActorId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownActor(name.to_string()))
    }

    /// Name of a registered actor; empty for an unknown id.
    pub fn actor_name(&self, id: ActorId) -> &str {
        self.actors.get(id.0).map(|a| a.name.as_str()).unwrap_or("")
    }

    pub fn actor_ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        (0..self.actors.len()).map(ActorId)
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn input_ports(&self, actor: ActorId) -> &[PortId] {
        self.actors.get(actor.0).map(|a| a.inputs.as_slice()).unwrap_or(&[])
    }

    pub fn output_ports(&self, actor: ActorId) -> &[PortId] {
        self.actors.get(actor.0).map(|a| a.outputs.as_slice()).unwrap_or(&[])
    }

    pub fn is_non_strict(&self, actor: ActorId) -> bool {
        self.actors.get(actor.0).is_some_and(|a| a.non_strict)
    }

    pub fn port_info(&self, port: PortId) -> Option<&PortInfo> {
        self.ports.get(port.0)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// `actor.port` for display
    pub fn port_path(&self, port: PortId) -> String {
        match self.ports.get(port.0) {
            Some(info) => format!("{}.{}", self.actor_name(info.actor), info.name),
            None => port.to_string(),
        }
    }

    /// Cells attached to a port
    pub fn cells_of(&self, port: PortId) -> &[CellId] {
        self.port_cells.get(port.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if the port feeds or reads at least one channel.
    pub fn is_connected(&self, port: PortId) -> bool {
        !self.cells_of(port).is_empty()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, cell: CellId) -> Option<&Channel> {
        self.channels.get(cell.0)
    }

    /// `producer -> consumer` label of a channel.
    pub fn channel_label(&self, cell: CellId) -> String {
        let Some(channel) = self.channels.get(cell.0) else {
            return cell.to_string();
        };
        format!(
            "{} -> {}",
            self.endpoint_label(&channel.producer),
            self.endpoint_label(&channel.consumer)
        )
    }

    fn endpoint_label(&self, endpoint: &Endpoint) -> String {
        match endpoint {
            Endpoint::Port(port) => self.port_path(*port),
            Endpoint::Boundary(label) => label.clone(),
        }
    }

    /// Find the channel between two `actor.port` paths.
    pub fn channel_between(&self, from: &str, to: &str) -> Result<CellId> {
        let producer = self.port(from)?;
        let consumer = self.port(to)?;
        self.cells_of(consumer)
            .iter()
            .copied()
            .find(|c| self.channels[c.0].producer == Endpoint::Port(producer))
            .ok_or_else(|| Error::UnknownPort(format!("{from} -> {to}")))
    }

    pub fn boundary_inputs(&self) -> &IndexMap<String, CellId> {
        &self.boundary_inputs
    }

    pub fn boundary_outputs(&self) -> &IndexMap<String, CellId> {
        &self.boundary_outputs
    }

    /// Topology version, bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn behavior_mut(&mut self, actor: ActorId) -> Option<&mut (dyn Actor + 'static)> {
        self.actors.get_mut(actor.0).map(|a| a.behavior.as_mut())
    }

    pub(crate) fn behavior(&self, actor: ActorId) -> Option<&(dyn Actor + 'static)> {
        self.actors.get(actor.0).map(|a| a.behavior.as_ref())
    }

    /// Per-actor cell wiring for the current topology.
    pub fn wiring(&self) -> Wiring {
        let actors = self
            .actors
            .iter()
            .map(|slot| ActorWiring {
                name: slot.name.clone(),
                non_strict: slot.non_strict,
                inputs: slot
                    .inputs
                    .iter()
                    .map(|p| self.port_cells[p.0].first().copied())
                    .collect(),
                outputs: slot
                    .outputs
                    .iter()
                    .map(|p| self.port_cells[p.0].clone())
                    .collect(),
            })
            .collect();
        let labels = (0..self.channels.len())
            .map(|i| self.channel_label(CellId(i)))
            .collect();
        Wiring {
            actors,
            labels,
            version: self.version,
        }
    }
}

/// Cells of one actor, by local port index
#[derive(Debug, Clone)]
pub struct ActorWiring {
    pub name: String,
    pub non_strict: bool,
    /// `None` for an unconnected input.
    pub inputs: Vec<Option<CellId>>,
    pub outputs: Vec<Vec<CellId>>,
}

/// Snapshot of how actors map onto cells, taken at one topology version.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    pub actors: Vec<ActorWiring>,
    /// Channel labels indexed by cell
    pub labels: Vec<String>,
    pub version: u64,
}

impl Wiring {
    pub fn actor(&self, id: ActorId) -> Option<&ActorWiring> {
        self.actors.get(id.0)
    }

    pub fn cell_count(&self) -> usize {
        self.labels.len()
    }
}
