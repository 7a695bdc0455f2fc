// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The boundary between the simulation and whatever realises the network.

use std::fmt;

use async_trait::async_trait;
use flowsim_controller::protocol::ControlSession;
use flowsim_engine::executor::Spawner;
use flowsim_engine::time::Ticks;
use flowsim_engine::types::SimError;
use flowsim_topology::{NodeId, Service};

/// What a platform needs to bring the network up.
#[derive(Clone)]
pub struct PlatformContext {
    pub spawner: Spawner,
    /// Switches connect to the controller through this session.
    pub session: ControlSession,
}

/// One application-level exchange between two hosts.
#[derive(Clone, Debug, PartialEq)]
pub struct Exchange {
    pub id: u64,
    pub service: Service,
    pub src: NodeId,
    pub dst: NodeId,
    pub bytes: u64,
}

/// The outcome of a successful exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub bytes: u64,
    pub elapsed: Ticks,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeError {
    /// No forwarding path between the endpoints.
    Unreachable,
    /// The destination does not offer the requested service.
    ConnectionRefused,
    /// The platform itself failed.
    Platform(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExchangeError::Unreachable => write!(f, "destination unreachable"),
            ExchangeError::ConnectionRefused => write!(f, "connection refused"),
            ExchangeError::Platform(msg) => write!(f, "platform error: {msg}"),
        }
    }
}

impl std::error::Error for ExchangeError {}

impl From<SimError> for ExchangeError {
    fn from(e: SimError) -> Self {
        ExchangeError::Platform(e.0)
    }
}

#[async_trait(?Send)]
pub trait EmulationPlatform {
    /// Bring up hosts, switches and links and start connecting switches to
    /// the controller.
    fn instantiate(&self, context: &PlatformContext) -> Result<(), SimError>;

    /// Carry out an exchange, completing when its last byte arrives.
    async fn execute(&self, exchange: Exchange) -> Result<Transfer, ExchangeError>;

    /// Release everything `instantiate` created.
    fn teardown(&self);
}
