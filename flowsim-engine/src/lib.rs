// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The flowsim engine executes event driven asynchronous simulations against
//! a single logical clock.
//!
//! The [engine](crate::engine::Engine) owns a single-threaded
//! [executor](crate::executor) and its [clock](crate::time::clock). Tasks are
//! plain `async` blocks returning a [SimResult](crate::types::SimResult).
//! They communicate through [events](crate::events) and
//! [channels](crate::channel) and model the passing of time by waiting on
//! the clock.
//!
//! Because the executor is single-threaded and deterministic, a simulation
//! run twice with the same inputs produces the same sequence of events.
//!
//! # Simple Application
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use flowsim_engine::engine::Engine;
//!
//! let mut engine = Engine::default();
//! let clock = engine.clock();
//! let done_at = Rc::new(Cell::new(0));
//! {
//!     let done_at = done_at.clone();
//!     engine.spawn(async move {
//!         clock.wait_ticks(250).await;
//!         done_at.set(clock.tick_now());
//!         Ok(())
//!     });
//! }
//! engine.run().unwrap();
//! assert_eq!(done_at.get(), 250);
//! ```

pub mod channel;
pub mod engine;
pub mod events;
pub mod executor;
pub mod test_helpers;
pub mod time;
pub mod traits;
pub mod types;
