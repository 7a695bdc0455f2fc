// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::fmt;
use std::io;

use flowsim_engine::types::SimError;
use flowsim_topology::TopologyError;
use flowsim_track::tracker::TrackConfigError;
use flowsim_traffic::error::TrafficError;

/// Errors that stop a run from starting or from finishing.
///
/// Failures of individual tasks are never reported this way; they are
/// recorded against the task and the run carries on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunError {
    /// Bad or empty inputs. The run never starts.
    Configuration(String),
    /// Not every switch connected to the controller in time.
    ControllerNotReady { connected: usize, expected: usize },
    /// The simulation engine itself failed.
    Simulation(String),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            RunError::ControllerNotReady {
                connected,
                expected,
            } => write!(
                f,
                "controller not ready: {connected} of {expected} switches connected"
            ),
            RunError::Simulation(msg) => write!(f, "simulation error: {msg}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<TopologyError> for RunError {
    fn from(e: TopologyError) -> Self {
        RunError::Configuration(e.to_string())
    }
}

impl From<TrafficError> for RunError {
    fn from(e: TrafficError) -> Self {
        RunError::Configuration(e.to_string())
    }
}

impl From<TrackConfigError> for RunError {
    fn from(e: TrackConfigError) -> Self {
        RunError::Configuration(e.to_string())
    }
}

impl From<figment::Error> for RunError {
    fn from(e: figment::Error) -> Self {
        RunError::Configuration(e.to_string())
    }
}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        RunError::Configuration(e.to_string())
    }
}

impl From<SimError> for RunError {
    fn from(e: SimError) -> Self {
        RunError::Simulation(e.0)
    }
}
