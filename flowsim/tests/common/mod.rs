// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A fake emulation platform so the scheduler can be tested without the
//! emulated network.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io;
use std::rc::Rc;

use async_trait::async_trait;
use flowsim::results::ResultLog;
use flowsim::simulation::{RunSettings, SimulationRun};
use flowsim_controller::protocol::{BufferId, ControlMessage, ControlSession, Datapath};
use flowsim_controller::rules::{FlowRule, RuleMatch};
use flowsim_emulation::platform::{
    EmulationPlatform, Exchange, ExchangeError, PlatformContext, Transfer,
};
use flowsim_engine::engine::Engine;
use flowsim_engine::time::Ticks;
use flowsim_engine::time::clock::Clock;
use flowsim_engine::types::SimError;
use flowsim_topology::{NodeId, Topology};
use flowsim_traffic::catalog::Catalog;
use flowsim_traffic::generator::{Arrivals, GeneratorConfig, KindConfig, TrafficGenerator};
use flowsim_traffic::task::TaskKind;

/// Two clients and a server on one switch.
pub const LAB: &str = "graph {
    h1 -- s1 -- web;
    h2 -- s1;
    web [role=server];
}";

struct NoopDatapath;

impl Datapath for NoopDatapath {
    fn install(&self, _rule: FlowRule) {}
    fn remove(&self, _switch: NodeId, _rule_match: RuleMatch, _priority: u16) {}
    fn packet_out(&self, _switch: NodeId, _buffer_id: BufferId) {}
}

/// Completes every exchange after a fixed time.
pub struct FakePlatform {
    clock: Clock,
    topology: Rc<Topology>,
    exchange_ticks: Ticks,
    /// Exchanges that take a different time, by exchange id.
    durations: RefCell<BTreeMap<u64, Ticks>>,
    /// Exchanges that fail once their time is up, by exchange id.
    failures: RefCell<BTreeMap<u64, ExchangeError>>,
    /// How many switches connect on instantiate. All of them if `None`.
    connecting: Cell<Option<usize>>,
    /// Set to make instantiate fail.
    instantiate_error: RefCell<Option<String>>,
    session: RefCell<Option<ControlSession>>,
    /// Exchange id and start time of every exchange, in start order.
    started: RefCell<Vec<(u64, Ticks)>>,
    torn_down: Cell<bool>,
}

impl FakePlatform {
    pub fn new(engine: &Engine, topology: Rc<Topology>, exchange_ticks: Ticks) -> Rc<Self> {
        Rc::new(Self {
            clock: engine.clock(),
            topology,
            exchange_ticks,
            durations: RefCell::new(BTreeMap::new()),
            failures: RefCell::new(BTreeMap::new()),
            connecting: Cell::new(None),
            instantiate_error: RefCell::new(None),
            session: RefCell::new(None),
            started: RefCell::new(Vec::new()),
            torn_down: Cell::new(false),
        })
    }

    pub fn set_duration(&self, exchange_id: u64, ticks: Ticks) {
        self.durations.borrow_mut().insert(exchange_id, ticks);
    }

    pub fn set_failure(&self, exchange_id: u64, error: ExchangeError) {
        self.failures.borrow_mut().insert(exchange_id, error);
    }

    pub fn connect_only(&self, switches: usize) {
        self.connecting.set(Some(switches));
    }

    pub fn fail_instantiate(&self, msg: &str) {
        *self.instantiate_error.borrow_mut() = Some(msg.to_string());
    }

    pub fn sever(&self) {
        if let Some(session) = self.session.borrow_mut().take() {
            session.sever();
        }
    }

    pub fn started(&self) -> Vec<(u64, Ticks)> {
        self.started.borrow().clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }
}

#[async_trait(?Send)]
impl EmulationPlatform for FakePlatform {
    fn instantiate(&self, context: &PlatformContext) -> Result<(), SimError> {
        if let Some(msg) = self.instantiate_error.borrow().clone() {
            return Err(SimError(msg));
        }
        let limit = self.connecting.get().unwrap_or(usize::MAX);
        for switch in self.topology.switches().take(limit) {
            context.session.send(ControlMessage::SwitchConnected {
                switch: switch.id,
                datapath: Rc::new(NoopDatapath),
            })?;
        }
        *self.session.borrow_mut() = Some(context.session.clone());
        Ok(())
    }

    async fn execute(&self, exchange: Exchange) -> Result<Transfer, ExchangeError> {
        let start = self.clock.tick_now();
        self.started.borrow_mut().push((exchange.id, start));
        let ticks = self
            .durations
            .borrow()
            .get(&exchange.id)
            .copied()
            .unwrap_or(self.exchange_ticks);
        self.clock.wait_ticks(ticks).await;

        let failure = self.failures.borrow().get(&exchange.id).cloned();
        match failure {
            Some(error) => Err(error),
            None => Ok(Transfer {
                bytes: exchange.bytes,
                elapsed: self.clock.tick_now() - start,
            }),
        }
    }

    fn teardown(&self) {
        self.torn_down.set(true);
    }
}

pub fn settings() -> RunSettings {
    RunSettings {
        duration: 10_000,
        workers: 4,
        task_timeout: 5_000,
        grace: 500,
        controller_ready_timeout: 1_000,
        check_interval: 100,
        ..RunSettings::default()
    }
}

/// `count` HTTP arrivals spread over `horizon`.
pub fn http_count(count: u64, horizon: Ticks, seed: u64) -> GeneratorConfig {
    GeneratorConfig {
        kinds: vec![KindConfig {
            kind: TaskKind::Http,
            arrivals: Arrivals::Count(count),
            size: None,
        }],
        horizon,
        seed,
        ..GeneratorConfig::default()
    }
}

/// Build a run on a fake platform whose exchanges take `exchange_ticks`.
pub fn build(
    engine: &Engine,
    topology: &str,
    generator: &GeneratorConfig,
    settings: RunSettings,
    exchange_ticks: Ticks,
) -> (Rc<SimulationRun>, Rc<FakePlatform>) {
    build_with_log(
        engine,
        topology,
        generator,
        settings,
        exchange_ticks,
        ResultLog::in_memory(),
    )
}

pub fn build_with_log(
    engine: &Engine,
    topology: &str,
    generator: &GeneratorConfig,
    settings: RunSettings,
    exchange_ticks: Ticks,
    results: ResultLog,
) -> (Rc<SimulationRun>, Rc<FakePlatform>) {
    let topology = Rc::new(Topology::from_dot_str(topology).unwrap());
    let generator = TrafficGenerator::new(
        engine.top(),
        &topology,
        &Catalog::default(),
        None,
        generator,
    )
    .unwrap();
    let platform = FakePlatform::new(engine, topology.clone(), exchange_ticks);
    let run = SimulationRun::new_and_register(
        engine,
        topology,
        generator,
        platform.clone(),
        results,
        settings,
    )
    .unwrap();
    (run, platform)
}

/// Accepts writes until it is told to fail.
pub struct FailingWriter {
    failing: Rc<Cell<bool>>,
}

impl FailingWriter {
    pub fn new() -> (Self, Rc<Cell<bool>>) {
        let failing = Rc::new(Cell::new(false));
        (
            Self {
                failing: failing.clone(),
            },
            failing,
        )
    }
}

impl io::Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failing.get() {
            Err(io::Error::other("disk full"))
        } else {
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
