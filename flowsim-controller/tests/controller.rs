// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use flowsim_controller::controller::{FlowController, InstallMode};
use flowsim_controller::protocol::{BufferId, ControlMessage, Datapath};
use flowsim_controller::rules::{FlowRule, RuleAction, RuleMatch, RuleState};
use flowsim_engine::engine::Engine;
use flowsim_engine::test_helpers::start_test;
use flowsim_topology::{NodeId, Topology};

/// Records everything the controller asks of a switch.
#[derive(Default)]
struct RecordingDatapath {
    installed: RefCell<Vec<FlowRule>>,
    removed: RefCell<Vec<(NodeId, RuleMatch)>>,
    packet_outs: RefCell<Vec<(NodeId, BufferId)>>,
}

impl Datapath for RecordingDatapath {
    fn install(&self, rule: FlowRule) {
        self.installed.borrow_mut().push(rule);
    }

    fn remove(&self, switch: NodeId, rule_match: RuleMatch, _priority: u16) {
        self.removed.borrow_mut().push((switch, rule_match));
    }

    fn packet_out(&self, switch: NodeId, buffer_id: BufferId) {
        self.packet_outs.borrow_mut().push((switch, buffer_id));
    }
}

/// h1 -- s1 -- s2 -- h2, plus h3 which is not connected to anything.
fn line() -> Rc<Topology> {
    Rc::new(
        Topology::from_dot_str(
            "graph { h1 -- s1 -- s2 -- h2; s1 -- h4; h3 [type=host] }",
        )
        .unwrap(),
    )
}

fn id(topology: &Topology, name: &str) -> NodeId {
    topology.node_by_name(name).unwrap().id
}

fn connect_all(
    engine: &Engine,
    controller: &Rc<FlowController>,
    datapath: &Rc<RecordingDatapath>,
) {
    let session = controller.session();
    let switches: Vec<NodeId> = controller.topology().switches().map(|s| s.id).collect();
    let datapath: Rc<dyn Datapath> = datapath.clone();
    engine.spawn(async move {
        for switch in switches {
            session.send(ControlMessage::SwitchConnected {
                switch,
                datapath: datapath.clone(),
            })?;
        }
        Ok(())
    });
}

#[test]
fn proactive_installs_every_pair() {
    let mut engine = start_test(file!());
    let topology = line();
    let controller =
        FlowController::new_and_register(&engine, engine.top(), topology.clone(), InstallMode::Proactive);
    let datapath = Rc::new(RecordingDatapath::default());
    connect_all(&engine, &controller, &datapath);

    {
        let controller = controller.clone();
        engine.spawn(async move {
            assert!(controller.wait_ready(1000).await);
            controller.shutdown();
            Ok(())
        });
    }
    engine.run().unwrap();

    let (h1, h2, h4) = (id(&topology, "h1"), id(&topology, "h2"), id(&topology, "h4"));
    let (s1, s2) = (id(&topology, "s1"), id(&topology, "s2"));

    // Pairs h1-h2 (2 switches), h1-h4 (1), h2-h4 (2), both directions, plus
    // one table-miss rule per switch.
    assert_eq!(controller.counters().rules_installed, 2 * (2 + 1 + 2) + 2);
    assert_eq!(controller.counters().misses_handled, 0);

    let installed = datapath.installed.borrow();
    let output = |switch: NodeId, src: NodeId, dst: NodeId| {
        installed
            .iter()
            .find(|r| r.switch == switch && r.rule_match == RuleMatch::pair(src, dst))
            .map(|r| r.action)
    };
    assert_eq!(
        output(s1, h1, h2),
        Some(RuleAction::Output(topology.port_towards(s1, s2).unwrap()))
    );
    assert_eq!(
        output(s2, h2, h1),
        Some(RuleAction::Output(topology.port_towards(s2, s1).unwrap()))
    );
    assert_eq!(
        output(s1, h4, h1),
        Some(RuleAction::Output(topology.port_towards(s1, h1).unwrap()))
    );
    assert_eq!(output(s2, h1, h4), None);

    // Shutdown expires everything it installed.
    assert_eq!(datapath.removed.borrow().len(), installed.len());
    assert!(controller.rules(s1).is_empty());
}

#[test]
fn reachability() {
    let engine = start_test(file!());
    let topology = line();
    let controller =
        FlowController::new_and_register(&engine, engine.top(), topology.clone(), InstallMode::Proactive);

    let (h1, h2, h3) = (id(&topology, "h1"), id(&topology, "h2"), id(&topology, "h3"));
    assert!(controller.is_reachable(h1, h2));
    assert!(controller.is_reachable(h2, h1));
    assert!(!controller.is_reachable(h1, h3));
    assert!(!controller.is_reachable(h3, h2));

    let forward = controller.path(h1, h2).unwrap();
    let mut backward = controller.path(h2, h1).unwrap();
    backward.reverse();
    assert_eq!(forward, backward);
}

#[test]
fn reactive_installs_on_miss() {
    let mut engine = start_test(file!());
    let topology = line();
    let controller =
        FlowController::new_and_register(&engine, engine.top(), topology.clone(), InstallMode::Reactive);
    let datapath = Rc::new(RecordingDatapath::default());
    connect_all(&engine, &controller, &datapath);

    let (h1, h2) = (id(&topology, "h1"), id(&topology, "h2"));
    let (s1, s2) = (id(&topology, "s1"), id(&topology, "s2"));
    {
        let controller = controller.clone();
        engine.spawn(async move {
            assert!(controller.wait_ready(10).await);
            assert_eq!(controller.counters().rules_installed, 2);
            controller.session().send(ControlMessage::PacketIn {
                switch: s1,
                src: h1,
                dst: h2,
                buffer_id: 7,
            })?;
            Ok(())
        });
    }
    engine.run().unwrap();

    assert_eq!(controller.counters().misses_handled, 1);
    // Both switches on the path, both directions.
    assert_eq!(controller.counters().rules_installed, 2 + 4);
    assert_eq!(*datapath.packet_outs.borrow(), vec![(s1, 7)]);
    assert!(
        controller
            .rules(s2)
            .iter()
            .any(|r| r.rule_match == RuleMatch::pair(h2, h1) && r.state == RuleState::Installed)
    );
}

#[test]
fn not_ready_times_out() {
    let mut engine = start_test(file!());
    let topology = line();
    let controller =
        FlowController::new_and_register(&engine, engine.top(), topology, InstallMode::Proactive);
    let ready = Rc::new(RefCell::new(None));
    {
        let controller = controller.clone();
        let ready = ready.clone();
        let clock = engine.clock();
        engine.spawn(async move {
            *ready.borrow_mut() = Some((controller.wait_ready(500).await, clock.tick_now()));
            Ok(())
        });
    }
    engine.run().unwrap();

    assert_eq!(*ready.borrow(), Some((false, 500)));
    assert_eq!(controller.connected_count(), 0);
}

#[test]
fn severed_session_is_lost() {
    let mut engine = start_test(file!());
    let controller =
        FlowController::new_and_register(&engine, engine.top(), line(), InstallMode::Proactive);
    let datapath = Rc::new(RecordingDatapath::default());
    connect_all(&engine, &controller, &datapath);
    {
        let session = controller.session();
        let clock = engine.clock();
        engine.spawn(async move {
            clock.wait_ticks(100).await;
            session.sever();
            Ok(())
        });
    }
    engine.run().unwrap();

    assert!(controller.session_lost().is_triggered());
}

#[test]
fn disconnect_expires_switch_rules() {
    let mut engine = start_test(file!());
    let topology = line();
    let controller =
        FlowController::new_and_register(&engine, engine.top(), topology.clone(), InstallMode::Proactive);
    let datapath = Rc::new(RecordingDatapath::default());
    connect_all(&engine, &controller, &datapath);
    let s2 = id(&topology, "s2");
    {
        let controller = controller.clone();
        engine.spawn(async move {
            assert!(controller.wait_ready(10).await);
            controller
                .session()
                .send(ControlMessage::SwitchDisconnected { switch: s2 })?;
            Ok(())
        });
    }
    engine.run().unwrap();

    assert!(controller.rules(s2).is_empty());
    assert!(!controller.is_ready());
    assert!(!controller.session_lost().is_triggered());
}
