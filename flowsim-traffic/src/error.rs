// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::fmt;

/// Errors building the inputs of traffic generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrafficError {
    /// Inputs that can never produce valid traffic.
    Configuration(String),
    /// A file could not be read or parsed.
    Io(String),
}

impl fmt::Display for TrafficError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrafficError::Configuration(msg) => write!(f, "{msg}"),
            TrafficError::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for TrafficError {}
