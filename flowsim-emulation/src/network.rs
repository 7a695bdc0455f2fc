// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! An in-process emulated network.
//!
//! Every switch owns a [`FlowTable`] which the controller programs through
//! the [`Datapath`] interface. Exchanges are carried out by walking a probe
//! through the flow tables hop by hop in both directions and then waiting
//! for the time the transfer would take on the path found.
//!
//! # Timing
//!
//! The round trip time is twice the sum of the link delays on the forward
//! path and the bottleneck is the slowest link on it. An exchange takes
//!
//! ```text
//! handshake_rtts * rtt + bytes * 8 / bottleneck
//! ```
//!
//! where HTTP needs 2 round trips before data flows and FTP needs 3 (its
//! control connection plus the data connection).

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use flowsim_controller::protocol::{BufferId, ControlMessage, ControlSession, Datapath};
use flowsim_controller::rules::{FlowRule, FlowTable, RuleAction, RuleMatch};
use flowsim_engine::engine::Engine;
use flowsim_engine::events::once::Once;
use flowsim_engine::sim_error;
use flowsim_engine::time::clock::Clock;
use flowsim_engine::time::{TICKS_PER_SEC, Ticks};
use flowsim_engine::types::SimError;
use flowsim_topology::{NodeId, NodeKind, Service, Topology};
use flowsim_track::entity::Entity;
use flowsim_track::{debug, info, trace, warn};

use crate::platform::{EmulationPlatform, Exchange, ExchangeError, PlatformContext, Transfer};

/// Round trips needed before payload data flows.
#[must_use]
pub fn handshake_rtts(service: Service) -> u64 {
    match service {
        Service::Http => 2,
        Service::Ftp => 3,
    }
}

/// Time to push `bytes` through a link of `bandwidth_mbps`, rounded up to
/// the next tick.
#[must_use]
pub fn serialisation_ticks(bytes: u64, bandwidth_mbps: f64) -> Ticks {
    if bandwidth_mbps <= 0.0 {
        return Ticks::MAX;
    }
    let bits_per_tick = bandwidth_mbps * 1e6 / TICKS_PER_SEC as f64;
    (bytes as f64 * 8.0 / bits_per_tick).ceil() as Ticks
}

/// A path found by probing the flow tables.
#[derive(Clone, Debug, PartialEq)]
pub struct Probe {
    pub hops: Vec<NodeId>,
    pub delay_ms: Ticks,
    pub bottleneck_mbps: f64,
}

impl Probe {
    #[must_use]
    pub fn rtt(&self) -> Ticks {
        2 * self.delay_ms
    }
}

#[derive(Default)]
struct NetworkState {
    instantiated: bool,
    tables: BTreeMap<NodeId, FlowTable>,
    connected: BTreeSet<NodeId>,
    session: Option<ControlSession>,
    buffers: BTreeMap<BufferId, Once<()>>,
    next_buffer: BufferId,
    packet_ins: usize,
}

struct NetworkShared {
    entity: Rc<Entity>,
    topology: Rc<Topology>,
    clock: Clock,
    state: RefCell<NetworkState>,
}

/// The emulated network. Cloning gives another handle onto the same network.
#[derive(Clone)]
pub struct EmulatedNetwork {
    shared: Rc<NetworkShared>,
}

impl fmt::Display for EmulatedNetwork {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.shared.entity)
    }
}

impl EmulatedNetwork {
    #[must_use]
    pub fn new(engine: &Engine, parent: &Rc<Entity>, topology: Rc<Topology>) -> Self {
        Self {
            shared: Rc::new(NetworkShared {
                entity: Rc::new(Entity::new(parent, "network")),
                topology,
                clock: engine.clock(),
                state: RefCell::new(NetworkState::default()),
            }),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &Rc<Entity> {
        &self.shared.entity
    }

    #[must_use]
    pub fn topology(&self) -> &Rc<Topology> {
        &self.shared.topology
    }

    /// A copy of the rules currently installed on a switch.
    #[must_use]
    pub fn flow_rules(&self, switch: NodeId) -> Vec<FlowRule> {
        self.shared
            .state
            .borrow()
            .tables
            .get(&switch)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of table misses sent to the controller.
    #[must_use]
    pub fn packet_ins(&self) -> usize {
        self.shared.state.borrow().packet_ins
    }

    #[must_use]
    pub fn connected_switches(&self) -> usize {
        self.shared.state.borrow().connected.len()
    }

    /// Drop the control connection of every switch, as a controller crash
    /// would.
    pub fn sever_control(&self) {
        let session = self.shared.state.borrow_mut().session.take();
        if let Some(session) = session {
            warn!(self.shared.entity ; "control connection severed");
            session.sever();
        }
        self.release_buffers();
    }

    fn release_buffers(&self) {
        let buffers = std::mem::take(&mut self.shared.state.borrow_mut().buffers);
        for (_, released) in buffers {
            released.notify_if_first(());
        }
    }

    fn connect_switch(&self, switch: NodeId) {
        let mut state = self.shared.state.borrow_mut();
        if !state.instantiated {
            return;
        }
        let Some(session) = state.session.clone() else {
            return;
        };
        state.connected.insert(switch);
        drop(state);

        let name = self.shared.topology.name(switch);
        debug!(self.shared.entity ; "{} connecting to controller", name);
        let datapath: Rc<dyn Datapath> = Rc::new(self.clone());
        if session
            .send(ControlMessage::SwitchConnected { switch, datapath })
            .is_err()
        {
            warn!(self.shared.entity ; "{} could not reach the controller", name);
            self.shared.state.borrow_mut().connected.remove(&switch);
        }
    }

    /// The next hop out of a host: straight to the destination if it is a
    /// neighbour, otherwise the peer on the host's first switch-facing port.
    fn host_egress(&self, host: NodeId, dst: NodeId) -> Option<NodeId> {
        let topology = &self.shared.topology;
        if topology.port_towards(host, dst).is_some() {
            return Some(dst);
        }
        topology
            .ports(host)
            .iter()
            .find(|p| topology.node(p.peer).kind == NodeKind::Switch)
            .map(|p| p.peer)
    }

    /// Look up the output port of a switch, raising a packet-in on a miss.
    async fn switch_egress(
        &self,
        switch: NodeId,
        src: NodeId,
        dst: NodeId,
    ) -> Result<Option<NodeId>, ExchangeError> {
        let mut asked_controller = false;
        loop {
            let action = self
                .shared
                .state
                .borrow()
                .tables
                .get(&switch)
                .and_then(|t| t.lookup(src, dst))
                .map(|r| r.action);

            match action {
                Some(RuleAction::Output(port)) => {
                    return Ok(self.shared.topology.peer(switch, port).map(|p| p.peer));
                }
                Some(RuleAction::Controller) if !asked_controller => {
                    asked_controller = true;
                    let Some(released) = self.packet_in(switch, src, dst)? else {
                        return Ok(None);
                    };
                    released.wait().await;
                }
                _ => return Ok(None),
            }
        }
    }

    fn packet_in(
        &self,
        switch: NodeId,
        src: NodeId,
        dst: NodeId,
    ) -> Result<Option<Once<()>>, ExchangeError> {
        let mut state = self.shared.state.borrow_mut();
        let Some(session) = state.session.clone() else {
            return Ok(None);
        };
        let buffer_id = state.next_buffer;
        state.next_buffer += 1;
        state.packet_ins += 1;
        let released = Once::new();
        state.buffers.insert(buffer_id, released.clone());
        drop(state);

        trace!(self.shared.entity ; "packet-in {} at {}", buffer_id, self.shared.topology.name(switch));
        session.send(ControlMessage::PacketIn {
            switch,
            src,
            dst,
            buffer_id,
        })?;
        Ok(Some(released))
    }

    /// Walk a packet from `src` to `dst` through the flow tables.
    pub async fn probe(&self, src: NodeId, dst: NodeId) -> Result<Probe, ExchangeError> {
        let topology = &self.shared.topology;
        let mut probe = Probe {
            hops: vec![src],
            delay_ms: 0,
            bottleneck_mbps: f64::INFINITY,
        };
        let mut visited = BTreeSet::from([src]);
        let mut current = src;

        while current != dst {
            let next = if current == src {
                self.host_egress(src, dst)
            } else if topology.node(current).is_switch() {
                self.switch_egress(current, src, dst).await?
            } else {
                // Hosts other than the source never forward.
                None
            };
            let Some(next) = next else {
                return Err(ExchangeError::Unreachable);
            };
            if !visited.insert(next) {
                debug!(self.shared.entity ; "forwarding loop at {}", topology.name(next));
                return Err(ExchangeError::Unreachable);
            }
            let Some(attrs) = topology.link_between(current, next) else {
                return Err(ExchangeError::Platform(format!(
                    "no link between {} and {}",
                    topology.name(current),
                    topology.name(next)
                )));
            };
            probe.delay_ms += attrs.delay_ms;
            probe.bottleneck_mbps = probe.bottleneck_mbps.min(attrs.bandwidth_mbps);
            probe.hops.push(next);
            current = next;
        }
        Ok(probe)
    }
}

impl Datapath for EmulatedNetwork {
    fn install(&self, rule: FlowRule) {
        let mut state = self.shared.state.borrow_mut();
        if state.connected.contains(&rule.switch) {
            state.tables.entry(rule.switch).or_default().install(rule);
        }
    }

    fn remove(&self, switch: NodeId, rule_match: RuleMatch, priority: u16) {
        if let Some(table) = self.shared.state.borrow_mut().tables.get_mut(&switch) {
            table.remove(&rule_match, priority);
        }
    }

    fn packet_out(&self, switch: NodeId, buffer_id: BufferId) {
        let released = self.shared.state.borrow_mut().buffers.remove(&buffer_id);
        match released {
            Some(released) => {
                released.notify_if_first(());
            }
            None => {
                warn!(self.shared.entity ; "packet-out for unknown buffer {} at {}",
                    buffer_id, self.shared.topology.name(switch));
            }
        }
    }
}

#[async_trait(?Send)]
impl EmulationPlatform for EmulatedNetwork {
    fn instantiate(&self, context: &PlatformContext) -> Result<(), SimError> {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.instantiated {
                return sim_error!(format!("{self}: already instantiated"));
            }
            state.instantiated = true;
            state.session = Some(context.session.clone());
        }

        let topology = &self.shared.topology;
        info!(self.shared.entity ; "instantiating {} hosts, {} switches, {} links",
            topology.hosts().count(), topology.switches().count(), topology.links().len());

        for switch in topology.switches() {
            let network = self.clone();
            let id = switch.id;
            let delay = switch.connect_delay_ms;
            let clock = self.shared.clock.clone();
            context.spawner.spawn(async move {
                if delay > 0 {
                    clock.wait_ticks(delay).await;
                }
                network.connect_switch(id);
                Ok(())
            });
        }
        Ok(())
    }

    async fn execute(&self, exchange: Exchange) -> Result<Transfer, ExchangeError> {
        let topology = &self.shared.topology;
        if !self.shared.state.borrow().instantiated {
            return Err(ExchangeError::Platform("network is not running".to_string()));
        }
        for node in [exchange.src, exchange.dst] {
            if node.0 >= topology.num_nodes() || !topology.node(node).is_host() {
                return Err(ExchangeError::Platform(format!("{node} is not a host")));
            }
        }

        let start = self.shared.clock.tick_now();
        let forward = self.probe(exchange.src, exchange.dst).await?;
        self.probe(exchange.dst, exchange.src).await?;

        if !topology.node(exchange.dst).offers(exchange.service) {
            self.shared.clock.wait_ticks(forward.rtt()).await;
            return Err(ExchangeError::ConnectionRefused);
        }

        let duration = handshake_rtts(exchange.service) * forward.rtt()
            + serialisation_ticks(exchange.bytes, forward.bottleneck_mbps);
        trace!(self.shared.entity ; "exchange {} takes {}ms over {} hops",
            exchange.id, duration, forward.hops.len() - 1);
        self.shared.clock.wait_ticks(duration).await;

        Ok(Transfer {
            bytes: exchange.bytes,
            elapsed: self.shared.clock.tick_now() - start,
        })
    }

    fn teardown(&self) {
        let (session, connected) = {
            let mut state = self.shared.state.borrow_mut();
            if !state.instantiated {
                return;
            }
            state.instantiated = false;
            state.tables.clear();
            (state.session.take(), std::mem::take(&mut state.connected))
        };

        if let Some(session) = session {
            for switch in connected {
                // The controller may already have closed the channel.
                if session.send(ControlMessage::SwitchDisconnected { switch }).is_err() {
                    break;
                }
            }
        }
        self.release_buffers();
        info!(self.shared.entity ; "torn down");
    }
}
