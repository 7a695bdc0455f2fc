// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Realising a topology so that traffic can be exchanged across it.
//!
//! The [`EmulationPlatform`](crate::platform::EmulationPlatform) trait is
//! the only thing the simulation knows about the network. The
//! [`EmulatedNetwork`](crate::network::EmulatedNetwork) implements it in
//! process, with switches whose flow tables are programmed by the flow
//! controller.

pub mod network;
pub mod platform;
