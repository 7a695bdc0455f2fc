// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Synthetic traffic for the flowsim simulator.
//!
//! A [`TrafficGenerator`](crate::generator::TrafficGenerator) turns arrival
//! processes, a [`Catalog`](crate::catalog::Catalog) of targets and an
//! optional diurnal [`TrafficProfile`](crate::profile::TrafficProfile) into
//! [`Task`](crate::task::Task)s, which wait in a
//! [`TaskQueue`](crate::queue::TaskQueue) until they are due.

pub mod catalog;
pub mod error;
pub mod generator;
pub mod profile;
pub mod queue;
pub mod sizes;
pub mod task;
