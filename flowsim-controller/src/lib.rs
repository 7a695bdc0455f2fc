// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The software-defined control plane.
//!
//! A [`FlowController`](crate::controller::FlowController) listens on a
//! control channel for switches connecting, disconnecting and reporting
//! packets that missed their flow tables. It programs each switch through
//! the [`Datapath`](crate::protocol::Datapath) handle the switch hands over
//! when it connects.
//!
//! Paths are the shortest in hops, with ties broken towards the smallest
//! sequence of node ids, and only switches forward traffic.

pub mod controller;
pub mod protocol;
pub mod rules;
