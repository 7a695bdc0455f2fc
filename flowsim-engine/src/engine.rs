// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;

use flowsim_track::Tracker;
use flowsim_track::entity::{Entity, toplevel};
use flowsim_track::tracker::stdout_tracker;

use crate::executor::{self, Executor, Spawner};
use crate::time::Ticks;
use crate::time::clock::{Clock, Pacing};
use crate::types::{Component, SimResult};

pub struct Engine {
    pub executor: Executor,
    pub spawner: Spawner,
    toplevel: Rc<Entity>,
    tracker: Tracker,
}

impl Engine {
    /// Create a standalone engine running in virtual time.
    #[must_use]
    pub fn new(tracker: &Tracker) -> Self {
        Self::with_pacing(tracker, Pacing::Virtual)
    }

    /// Create an engine whose clock uses the given [`Pacing`].
    #[must_use]
    pub fn with_pacing(tracker: &Tracker, pacing: Pacing) -> Self {
        let toplevel = toplevel(tracker, "top");
        let (executor, spawner) = executor::new_executor_and_spawner(&toplevel, Clock::new(pacing));
        Self {
            executor,
            spawner,
            toplevel,
            tracker: tracker.clone(),
        }
    }

    /// Run until there is nothing left to do.
    pub fn run(&mut self) -> SimResult {
        // Pass a flag that will never be set
        let finished = Rc::new(Cell::new(false));
        self.executor.run(&finished)
    }

    /// Register a component so that its `run` function is spawned.
    pub fn register(&self, component: Component) {
        self.executor.spawn(async move { component.run().await });
    }

    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.executor.spawn(future);
    }

    #[must_use]
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.executor.clock()
    }

    #[must_use]
    pub fn tick_now(&self) -> Ticks {
        self.executor.tick_now()
    }

    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }

    #[must_use]
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

/// Create a default engine that sends [`Track`](flowsim_track::Track) events
/// at `Warn` and above to stdout.
impl Default for Engine {
    fn default() -> Self {
        let tracker = stdout_tracker(log::Level::Warn);
        Self::new(&tracker)
    }
}
