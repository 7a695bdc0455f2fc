// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The flow controller.
//!
//! The controller consumes [`ControlMessage`]s from its control channel and
//! programs switch flow tables so that hosts can reach each other.
//!
//! # Function
//!
//!  - When a switch connects it receives the table-miss rule. In
//!    [proactive](InstallMode::Proactive) mode it also receives the rules of
//!    every host pair whose path crosses it, in both directions.
//!  - When a packet misses every rule the switch raises a packet-in. The
//!    controller installs the path for that host pair on every connected
//!    switch along it and then resubmits the buffered packet.
//!  - When a switch disconnects, or the controller shuts down, the rules of
//!    the detached switches expire.
//!
//! If the control channel is closed by the switch side the session is lost
//! and [`FlowController::session_lost`] fires.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use async_trait::async_trait;
use flowsim_engine::channel::{Receiver, Sender, unbounded};
use flowsim_engine::engine::Engine;
use flowsim_engine::events::once::Once;
use flowsim_engine::events::repeated::Repeated;
use flowsim_engine::time::Ticks;
use flowsim_engine::time::clock::Clock;
use flowsim_engine::traits::Runnable;
use flowsim_engine::types::SimResult;
use flowsim_topology::paths::shortest_path;
use flowsim_topology::{NodeId, Topology};
use flowsim_track::entity::Entity;
use flowsim_track::{debug, info, trace, warn};
use futures::future::{Either, select};
use itertools::Itertools;

use crate::protocol::{BufferId, ControlMessage, ControlSession, Datapath};
use crate::rules::{FlowRule, FlowTable, PATH_PRIORITY, RuleAction, RuleMatch};

/// When path rules are installed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstallMode {
    /// Install every path as soon as its switches connect.
    #[default]
    Proactive,
    /// Only install the table-miss rule and react to packet-ins.
    Reactive,
}

impl FromStr for InstallMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proactive" => Ok(InstallMode::Proactive),
            "reactive" => Ok(InstallMode::Reactive),
            _ => Err(format!(
                "Unknown install mode '{s}' (expected proactive or reactive)"
            )),
        }
    }
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InstallMode::Proactive => write!(f, "proactive"),
            InstallMode::Reactive => write!(f, "reactive"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerCounters {
    pub rules_installed: usize,
    pub misses_handled: usize,
}

#[derive(Default)]
struct ControllerState {
    datapaths: BTreeMap<NodeId, Rc<dyn Datapath>>,
    tables: BTreeMap<NodeId, FlowTable>,
    counters: ControllerCounters,
    shutting_down: bool,
}

pub struct FlowController {
    pub entity: Rc<Entity>,
    topology: Rc<Topology>,
    mode: InstallMode,
    clock: Clock,
    tx: Sender<ControlMessage>,
    rx: Receiver<ControlMessage>,

    /// Paths between every connected pair of hosts, keyed by (lower id,
    /// higher id) and running from the lower id host.
    paths: BTreeMap<(NodeId, NodeId), Vec<NodeId>>,

    state: RefCell<ControllerState>,
    connections_changed: Repeated,
    session_lost: Once<()>,
}

impl fmt::Display for FlowController {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.entity)
    }
}

impl FlowController {
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        topology: Rc<Topology>,
        mode: InstallMode,
    ) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, "controller"));

        let hosts: Vec<NodeId> = topology.hosts().map(|h| h.id).collect();
        let mut paths = BTreeMap::new();
        for (a, b) in hosts.iter().copied().tuple_combinations() {
            match shortest_path(&topology, a, b) {
                Some(path) => {
                    paths.insert((a, b), path);
                }
                None => {
                    debug!(entity ; "{} and {} are unreachable", topology.name(a), topology.name(b));
                }
            }
        }

        let (tx, rx) = unbounded();
        let rc_self = Rc::new(Self {
            entity,
            topology,
            mode,
            clock: engine.clock(),
            tx,
            rx,
            paths,
            state: RefCell::new(ControllerState::default()),
            connections_changed: Repeated::new(),
            session_lost: Once::new(),
        });
        engine.register(rc_self.clone());
        rc_self
    }

    /// A new switch-side handle onto the control channel.
    #[must_use]
    pub fn session(&self) -> ControlSession {
        ControlSession::new(self.tx.clone())
    }

    #[must_use]
    pub fn mode(&self) -> InstallMode {
        self.mode
    }

    #[must_use]
    pub fn topology(&self) -> &Rc<Topology> {
        &self.topology
    }

    /// The path the controller routes `src` to `dst` traffic along.
    #[must_use]
    pub fn path(&self, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
        if src == dst {
            return Some(vec![src]);
        }
        let path = self.paths.get(&(src.min(dst), src.max(dst)))?;
        if src < dst {
            Some(path.clone())
        } else {
            Some(path.iter().rev().copied().collect())
        }
    }

    #[must_use]
    pub fn is_reachable(&self, src: NodeId, dst: NodeId) -> bool {
        src == dst || self.paths.contains_key(&(src.min(dst), src.max(dst)))
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.state.borrow().datapaths.len()
    }

    #[must_use]
    pub fn expected_count(&self) -> usize {
        self.topology.switches().count()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.connected_count() >= self.expected_count()
    }

    /// Wait until every switch in the topology has connected.
    ///
    /// Returns `false` if that has not happened within `timeout` ticks.
    pub async fn wait_ready(&self, timeout: Ticks) -> bool {
        let deadline = self.clock.tick_now().saturating_add(timeout);
        loop {
            if self.is_ready() {
                info!(self.entity ; "{} switches connected", self.connected_count());
                return true;
            }
            if self.clock.tick_now() >= deadline {
                warn!(self.entity ; "only {}/{} switches connected", self.connected_count(), self.expected_count());
                return false;
            }
            let changed = self.connections_changed.wait();
            let expired = self.clock.wait_until(deadline);
            select(changed, expired).await;
        }
    }

    /// An event that fires if the switch side closes the control channel.
    #[must_use]
    pub fn session_lost(&self) -> Once<()> {
        self.session_lost.clone()
    }

    #[must_use]
    pub fn counters(&self) -> ControllerCounters {
        self.state.borrow().counters
    }

    /// The controller's view of the rules installed on a switch.
    #[must_use]
    pub fn rules(&self, switch: NodeId) -> Vec<FlowRule> {
        self.state
            .borrow()
            .tables
            .get(&switch)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Expire every rule, detach every switch and close the control channel.
    pub fn shutdown(&self) {
        let mut state = self.state.borrow_mut();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;

        let datapaths = std::mem::take(&mut state.datapaths);
        let mut expired = 0;
        for (switch, table) in &mut state.tables {
            let rules = table.expire_all();
            if let Some(datapath) = datapaths.get(switch) {
                for rule in &rules {
                    datapath.remove(*switch, rule.rule_match, rule.priority);
                }
            }
            expired += rules.len();
        }
        state.tables.clear();
        drop(state);

        info!(self.entity ; "shut down, {} rules expired", expired);
        self.tx.close();
        self.connections_changed.notify();
    }

    fn handle(&self, msg: ControlMessage) -> SimResult {
        trace!(self.entity ; "{:?}", msg);
        match msg {
            ControlMessage::SwitchConnected { switch, datapath } => {
                self.on_connect(switch, datapath);
            }
            ControlMessage::PacketIn {
                switch,
                src,
                dst,
                buffer_id,
            } => self.on_packet_in(switch, src, dst, buffer_id),
            ControlMessage::SwitchDisconnected { switch } => self.on_disconnect(switch),
        }
        Ok(())
    }

    fn on_connect(&self, switch: NodeId, datapath: Rc<dyn Datapath>) {
        if self.state.borrow().shutting_down {
            return;
        }
        info!(self.entity ; "switch {} connected", self.topology.name(switch));
        self.state
            .borrow_mut()
            .datapaths
            .insert(switch, datapath.clone());

        self.install(switch, datapath.as_ref(), FlowRule::table_miss(switch));

        if self.mode == InstallMode::Proactive {
            for path in self.paths.values() {
                if let Some(position) = path.iter().position(|n| *n == switch) {
                    self.install_at(path, position, datapath.as_ref());
                }
            }
        }
        self.connections_changed.notify();
    }

    fn on_packet_in(&self, switch: NodeId, src: NodeId, dst: NodeId, buffer_id: BufferId) {
        self.state.borrow_mut().counters.misses_handled += 1;
        debug!(self.entity ; "table miss at {} for {} -> {}",
            self.topology.name(switch), self.topology.name(src), self.topology.name(dst));

        match self.path(src, dst) {
            Some(path) => {
                let datapaths = self.state.borrow().datapaths.clone();
                for (position, node) in path.iter().enumerate() {
                    if let Some(datapath) = datapaths.get(node) {
                        self.install_at(&path, position, datapath.as_ref());
                    }
                }
            }
            None => {
                debug!(self.entity ; "no path from {} to {}", self.topology.name(src), self.topology.name(dst));
            }
        }

        let datapath = self.state.borrow().datapaths.get(&switch).cloned();
        match datapath {
            Some(datapath) => datapath.packet_out(switch, buffer_id),
            None => {
                warn!(self.entity ; "packet-in from unknown switch {}", self.topology.name(switch));
            }
        }
    }

    fn on_disconnect(&self, switch: NodeId) {
        let mut state = self.state.borrow_mut();
        state.datapaths.remove(&switch);
        let expired = state
            .tables
            .remove(&switch)
            .map_or(0, |mut table| table.expire_all().len());
        drop(state);

        info!(self.entity ; "switch {} disconnected, {} rules expired", self.topology.name(switch), expired);
        self.connections_changed.notify();
    }

    /// Install the rules for both directions of `path` on the switch at
    /// `position`.
    fn install_at(&self, path: &[NodeId], position: usize, datapath: &dyn Datapath) {
        if position == 0 || position + 1 >= path.len() {
            // Endpoints are hosts.
            return;
        }
        let switch = path[position];
        let (Some(&src), Some(&dst)) = (path.first(), path.last()) else {
            return;
        };
        let towards = |next: NodeId| self.topology.port_towards(switch, next);

        if let Some(port) = towards(path[position + 1]) {
            let rule = FlowRule::new(switch, RuleMatch::pair(src, dst), RuleAction::Output(port), PATH_PRIORITY);
            self.install(switch, datapath, rule);
        }
        if let Some(port) = towards(path[position - 1]) {
            let rule = FlowRule::new(switch, RuleMatch::pair(dst, src), RuleAction::Output(port), PATH_PRIORITY);
            self.install(switch, datapath, rule);
        }
    }

    fn install(&self, switch: NodeId, datapath: &dyn Datapath, rule: FlowRule) {
        let mut state = self.state.borrow_mut();
        if state.tables.entry(switch).or_default().install(rule.clone()) {
            state.counters.rules_installed += 1;
            drop(state);
            trace!(self.entity ; "install {}", rule);
            datapath.install(rule);
        }
    }
}

#[async_trait(?Send)]
impl Runnable for FlowController {
    async fn run(&self) -> SimResult {
        while let Some(msg) = self.rx.recv().await {
            self.handle(msg)?;
        }

        if !self.state.borrow().shutting_down && self.session_lost.notify_if_first(()) {
            warn!(self.entity ; "control session lost at {}ms", self.clock.tick_now());
        }
        Ok(())
    }
}

/// Wait for either the controller to become ready or the session to be lost.
///
/// Returns `true` only when every switch connected in time.
pub async fn wait_ready_or_lost(controller: &FlowController, timeout: Ticks) -> bool {
    let lost = controller.session_lost().wait();
    let ready = Box::pin(controller.wait_ready(timeout));
    match select(ready, lost).await {
        Either::Left((ready, _)) => ready,
        Either::Right(_) => false,
    }
}
