// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The control-plane protocol between switches and the controller.
//!
//! Switches talk to the controller by sending [`ControlMessage`]s over a
//! [`ControlSession`]. The controller programs switches through the
//! [`Datapath`] handle each switch provides when it connects.

use std::fmt;
use std::rc::Rc;

use flowsim_engine::channel::Sender;
use flowsim_engine::types::SimError;
use flowsim_topology::NodeId;

use crate::rules::{FlowRule, RuleMatch};

/// Identifies a packet held by a switch while the controller decides what
/// to do with it.
pub type BufferId = u64;

/// Operations the controller can perform on a switch.
pub trait Datapath {
    /// Add or replace a rule in the switch's flow table.
    fn install(&self, rule: FlowRule);

    /// Remove a rule from the switch's flow table.
    fn remove(&self, switch: NodeId, rule_match: RuleMatch, priority: u16);

    /// Resubmit a buffered packet to the switch's flow table.
    fn packet_out(&self, switch: NodeId, buffer_id: BufferId);
}

pub enum ControlMessage {
    SwitchConnected {
        switch: NodeId,
        datapath: Rc<dyn Datapath>,
    },
    /// A packet missed every rule in the switch's flow table.
    PacketIn {
        switch: NodeId,
        src: NodeId,
        dst: NodeId,
        buffer_id: BufferId,
    },
    SwitchDisconnected {
        switch: NodeId,
    },
}

impl fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlMessage::SwitchConnected { switch, .. } => {
                write!(f, "SwitchConnected({switch})")
            }
            ControlMessage::PacketIn {
                switch,
                src,
                dst,
                buffer_id,
            } => write!(f, "PacketIn({switch}: {src}->{dst}, buffer {buffer_id})"),
            ControlMessage::SwitchDisconnected { switch } => {
                write!(f, "SwitchDisconnected({switch})")
            }
        }
    }
}

/// The switch side of the control channel.
#[derive(Clone)]
pub struct ControlSession {
    tx: Sender<ControlMessage>,
}

impl ControlSession {
    #[must_use]
    pub fn new(tx: Sender<ControlMessage>) -> Self {
        Self { tx }
    }

    pub fn send(&self, msg: ControlMessage) -> Result<(), SimError> {
        self.tx.send(msg)
    }

    /// Drop the connection to the controller.
    pub fn sever(&self) {
        self.tx.close();
    }

    #[must_use]
    pub fn is_severed(&self) -> bool {
        self.tx.is_closed()
    }
}
