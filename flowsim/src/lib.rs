// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Drive scheduled client/server traffic across an emulated
//! software-defined network.
//!
//! A run instantiates a topology on an
//! [emulation platform](flowsim_emulation::platform::EmulationPlatform),
//! waits for every switch to connect to the
//! [flow controller](flowsim_controller::controller::FlowController) and
//! then executes generated HTTP and FTP tasks on a bounded
//! [worker pool](crate::pool::WorkerPool) until the run duration has
//! elapsed and nothing is left in flight. Every finished task is written to
//! the [result log](crate::results) as one CSV record.
//!
//! Task failures (unreachable destinations, timeouts, refused connections,
//! cancellation) are recorded and never stop the run. Only a controller
//! that does not come up in time, a lost control session or an explicit
//! stop end a run early.
//!
//! # Examples
//!
//! Five minutes of traffic over a layout with a gateway, logging the
//! controller only:
//! ```txt
//! cargo run --bin flowsim --release -- --topology lab.yaml --catalog sites.yaml \
//!     --duration-secs 300 --results results.csv \
//!     --stdout true --stdout-filter-regex ".*controller.*"
//! ```
//!
//! The same values can be given in a TOML file passed with `--conf-file` or
//! as `FLOWSIM_`-prefixed environment variables.

pub mod builder;
pub mod config;
pub mod error;
pub mod pool;
pub mod report;
pub mod results;
pub mod simulation;
