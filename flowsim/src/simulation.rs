// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The run context and its scheduling loop.
//!
//! A [`SimulationRun`] owns everything a run needs: the task queue, the
//! traffic generator, the flow controller, the worker pool and the result
//! log. Nothing is global, so several runs can share one process, each on
//! its own [`Engine`].
//!
//! The run moves through [`RunState`]s:
//!
//! - `Init`: the platform is instantiated and the run waits for every
//!   switch to connect to the controller.
//! - `Running`: the scheduling loop moves generated tasks into the queue,
//!   dispatches the ones that are due and sleeps until the next thing can
//!   happen.
//! - `Completed` once the duration has elapsed with nothing left queued or
//!   in flight, or `Aborted` on a stop, a lost control session or an error.
//!
//! However the run ends, the result log is flushed and the controller and
//! platform are released before the report is made.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use flowsim_controller::controller::{FlowController, InstallMode, wait_ready_or_lost};
use flowsim_emulation::platform::{EmulationPlatform, PlatformContext};
use flowsim_engine::engine::Engine;
use flowsim_engine::events::once::{Once, OnceFuture};
use flowsim_engine::executor::Spawner;
use flowsim_engine::time::clock::Clock;
use flowsim_engine::time::{Ticks, format_ticks, secs_to_ticks};
use flowsim_engine::traits::Runnable;
use flowsim_engine::types::{SimError, SimResult};
use flowsim_topology::Topology;
use flowsim_track::entity::Entity;
use flowsim_track::{debug, error, info, trace, warn};
use flowsim_traffic::generator::TrafficGenerator;
use flowsim_traffic::queue::TaskQueue;
use flowsim_traffic::task::{ErrorKind, Task};
use futures::future::{Either, select};

use crate::config::{
    DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_CONTROLLER_READY_TIMEOUT_SECS, DEFAULT_DURATION_SECS,
    DEFAULT_GRACE_SECS, DEFAULT_TASK_TIMEOUT_SECS, DEFAULT_WORKERS,
};
use crate::error::RunError;
use crate::pool::WorkerPool;
use crate::report::{AbortCause, RunReport, RunState};
use crate::results::{Recorder, ResultLog, TaskRecord};

/// Timing and sizing of a run, in ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSettings {
    pub duration: Ticks,
    pub workers: usize,
    pub task_timeout: Ticks,
    /// How long in-flight tasks get to finish after an abort.
    pub grace: Ticks,
    pub controller_ready_timeout: Ticks,
    /// Longest the scheduler sleeps when nothing is due.
    pub check_interval: Ticks,
    pub install_mode: InstallMode,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            duration: secs_to_ticks(DEFAULT_DURATION_SECS),
            workers: DEFAULT_WORKERS,
            task_timeout: secs_to_ticks(DEFAULT_TASK_TIMEOUT_SECS),
            grace: secs_to_ticks(DEFAULT_GRACE_SECS),
            controller_ready_timeout: secs_to_ticks(DEFAULT_CONTROLLER_READY_TIMEOUT_SECS),
            check_interval: secs_to_ticks(DEFAULT_CHECK_INTERVAL_SECS),
            install_mode: InstallMode::Proactive,
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<(), RunError> {
        let zero = [
            (self.duration, "duration"),
            (self.task_timeout, "task timeout"),
            (self.controller_ready_timeout, "controller ready timeout"),
            (self.check_interval, "check interval"),
        ]
        .into_iter()
        .find(|(ticks, _)| *ticks == 0);
        if let Some((_, name)) = zero {
            return Err(RunError::Configuration(format!("{name} must be non-zero")));
        }
        if self.workers == 0 {
            return Err(RunError::Configuration(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        Ok(())
    }
}

/// Requests that a run stops early.
#[derive(Clone, Default)]
pub struct StopHandle {
    stop: Once<()>,
}

impl StopHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a stop had already been requested.
    pub fn stop(&self) -> bool {
        self.stop.notify_if_first(())
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_triggered()
    }

    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait(&self) -> OnceFuture<()> {
        self.stop.wait()
    }
}

/// Stop the run `after` ticks from now, unless it has finished by then.
pub fn schedule_stop(spawner: &Spawner, clock: Clock, stop: StopHandle, after: Ticks) {
    spawner.spawn(async move {
        clock.wait_ticks_or_exit(after).await;
        stop.stop();
        Ok(())
    });
}

pub struct SimulationRun {
    pub entity: Rc<Entity>,
    clock: Clock,
    settings: RunSettings,
    controller: Rc<FlowController>,
    platform: Rc<dyn EmulationPlatform>,
    context: PlatformContext,
    generator: RefCell<TrafficGenerator>,
    queue: RefCell<TaskQueue>,
    pool: Rc<WorkerPool>,
    recorder: Rc<Recorder>,
    stop: StopHandle,
    state: Cell<RunState>,
    report: RefCell<Option<RunReport>>,
}

impl fmt::Display for SimulationRun {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.entity)
    }
}

impl SimulationRun {
    /// Build the run and register it, with its controller and workers, on
    /// `engine`. Nothing happens until the engine runs.
    pub fn new_and_register(
        engine: &Engine,
        topology: Rc<Topology>,
        generator: TrafficGenerator,
        platform: Rc<dyn EmulationPlatform>,
        results: ResultLog,
        settings: RunSettings,
    ) -> Result<Rc<Self>, RunError> {
        settings.validate()?;
        let entity = Rc::new(Entity::new(engine.top(), "simulation"));

        let controller = FlowController::new_and_register(
            engine,
            engine.top(),
            topology.clone(),
            settings.install_mode,
        );
        let recorder = Rc::new(Recorder::new(engine.top(), topology, results));
        let pool = WorkerPool::new_and_register(
            engine,
            engine.top(),
            settings.workers,
            settings.task_timeout,
            platform.clone(),
            recorder.clone(),
        );
        let context = PlatformContext {
            spawner: engine.spawner(),
            session: controller.session(),
        };

        let rc_self = Rc::new(Self {
            entity,
            clock: engine.clock(),
            settings,
            controller,
            platform,
            context,
            generator: RefCell::new(generator),
            queue: RefCell::new(TaskQueue::new()),
            pool,
            recorder,
            stop: StopHandle::new(),
            state: Cell::new(RunState::Init),
            report: RefCell::new(None),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// The report of the run, once it has finished.
    #[must_use]
    pub fn report(&self) -> Option<RunReport> {
        self.report.borrow().clone()
    }

    #[must_use]
    pub fn records(&self) -> Vec<TaskRecord> {
        self.recorder.records()
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub fn controller(&self) -> &Rc<FlowController> {
        &self.controller
    }

    #[must_use]
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Wait for the control plane. Returns why the run cannot go on, if it
    /// cannot.
    async fn wait_until_ready(&self) -> Option<AbortCause> {
        let ready = Box::pin(wait_ready_or_lost(
            &self.controller,
            self.settings.controller_ready_timeout,
        ));
        match select(ready, self.stop.wait()).await {
            Either::Left((true, _)) => None,
            Either::Left((false, _)) => {
                if self.controller.session_lost().is_triggered() {
                    Some(AbortCause::ControllerSessionLost)
                } else {
                    Some(AbortCause::ControllerNotReady {
                        connected: self.controller.connected_count(),
                        expected: self.controller.expected_count(),
                    })
                }
            }
            Either::Right(_) => Some(AbortCause::Stopped),
        }
    }

    fn generate(&self, now: Ticks) -> SimResult {
        let tasks = self.generator.borrow_mut().advance(now);
        let mut queue = self.queue.borrow_mut();
        for task in tasks {
            trace!(self.entity ; "queue {task}");
            queue
                .enqueue(task)
                .map_err(|e| SimError(e.to_string()))?;
        }
        Ok(())
    }

    fn dispatch(&self, mut task: Task, now: Ticks) -> SimResult {
        if self.controller.is_reachable(task.src, task.dst) {
            return self.pool.admit(task);
        }
        task.fail(now, ErrorKind::Unreachable)
            .map_err(|e| SimError(e.to_string()))?;
        debug!(self.entity ; "{task} is unreachable");
        self.recorder.record(&task)
    }

    /// The earliest time the scheduler has something to do after `now`.
    fn next_wake(&self, now: Ticks) -> Ticks {
        let mut wake = now.saturating_add(self.settings.check_interval);
        if now < self.settings.duration {
            wake = wake.min(self.settings.duration);
        }
        let queued = self.queue.borrow().peek_next_time();
        let generated = self.generator.borrow().peek_next_time();
        for time in [queued, generated].into_iter().flatten() {
            wake = wake.min(time);
        }
        wake.max(now + 1)
    }

    /// The RUNNING loop. Returns the abort cause if the run did not
    /// complete.
    async fn schedule(&self) -> Result<Option<AbortCause>, SimError> {
        let lost = self.controller.session_lost();
        loop {
            if self.stop.is_stopped() {
                return Ok(Some(AbortCause::Stopped));
            }
            if lost.is_triggered() {
                return Ok(Some(AbortCause::ControllerSessionLost));
            }
            if let Some(e) = self.pool.take_failure() {
                return Err(e);
            }

            let now = self.clock.tick_now();
            self.generate(now)?;
            let due = self.queue.borrow_mut().dequeue_due(now);
            for task in due {
                self.dispatch(task, now)?;
            }

            if now >= self.settings.duration
                && self.queue.borrow().is_empty()
                && self.pool.outstanding() == 0
            {
                return Ok(None);
            }

            let wake = self.next_wake(now);
            let woken = select(self.clock.wait_until(wake), self.pool.activity());
            let interrupted = select(self.stop.wait(), lost.wait());
            select(woken, interrupted).await;
        }
    }

    /// Cancel everything that has not finished and wait for the workers to
    /// give up their tasks. Every task is accounted for even if recording
    /// fails; the first error is returned.
    async fn drain(&self) -> SimResult {
        self.generator.borrow_mut().stop();
        let now = self.clock.tick_now();

        let mut leftover = {
            let mut queue = self.queue.borrow_mut();
            queue.close();
            queue.drain()
        };
        leftover.extend(self.pool.drain_waiting());
        if !leftover.is_empty() {
            debug!(self.entity ; "cancelling {} tasks that never started", leftover.len());
        }
        let mut first_error = None;
        for mut task in leftover {
            let recorded = task
                .fail(now, ErrorKind::Cancelled)
                .map_err(|e| SimError(e.to_string()))
                .and_then(|()| self.recorder.record(&task));
            if let Err(e) = recorded {
                first_error.get_or_insert(e);
            }
        }

        self.pool.cancel(now.saturating_add(self.settings.grace));
        while self.pool.outstanding() > 0 {
            self.pool.activity().await;
        }
        match first_error.or_else(|| self.pool.take_failure()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn finish(&self, state: RunState, abort_cause: Option<AbortCause>) -> SimResult {
        self.generator.borrow_mut().stop();
        let flushed = self.recorder.flush();
        self.controller.shutdown();
        self.platform.teardown();
        self.pool.close();

        let mut report = RunReport {
            state,
            end_time: self.clock.tick_now(),
            generated: self.generator.borrow().num_generated(),
            abort_cause,
            ..RunReport::default()
        };
        report.tally(&self.recorder.records());
        report.set_counters(self.controller.counters());

        info!(self.entity ; "run {} at {}: {} done, {} failed",
            state, format_ticks(report.end_time), report.done, report.total_failed());
        self.state.set(state);
        *self.report.borrow_mut() = Some(report);
        flushed
    }
}

#[async_trait(?Send)]
impl Runnable for SimulationRun {
    async fn run(&self) -> SimResult {
        if let Err(e) = self.platform.instantiate(&self.context) {
            error!(self.entity ; "unable to instantiate the topology: {e}");
            let cause = AbortCause::PlatformFailure(e.0.clone());
            if let Err(flush) = self.finish(RunState::Aborted, Some(cause)) {
                warn!(self.entity ; "{flush}");
            }
            return Err(e);
        }

        if let Some(cause) = self.wait_until_ready().await {
            warn!(self.entity ; "aborting before any traffic: {cause}");
            return self.finish(RunState::Aborted, Some(cause));
        }

        info!(self.entity ; "running for {}", format_ticks(self.settings.duration));
        self.state.set(RunState::Running);
        let (cause, mut fatal) = match self.schedule().await {
            Ok(None) => return self.finish(RunState::Completed, None),
            Ok(Some(cause)) => (cause, None),
            Err(e) => (AbortCause::Failed(e.0.clone()), Some(e)),
        };

        warn!(self.entity ; "aborting at {}ms: {cause}", self.clock.tick_now());
        if let Err(e) = self.drain().await {
            fatal.get_or_insert(e);
        }
        let finished = self.finish(RunState::Aborted, Some(cause));
        match fatal {
            Some(e) => Err(e),
            None => finished,
        }
    }
}

/// Run `engine` to the end and return the report of `run`.
///
/// A run that could not get its control plane ready is an error rather
/// than a report.
pub fn run_to_completion(engine: &mut Engine, run: &SimulationRun) -> Result<RunReport, RunError> {
    engine.run()?;
    let Some(report) = run.report() else {
        return Err(RunError::Simulation(
            "engine stopped before the run finished".to_string(),
        ));
    };
    if let Some(AbortCause::ControllerNotReady {
        connected,
        expected,
    }) = &report.abort_cause
    {
        return Err(RunError::ControllerNotReady {
            connected: *connected,
            expected: *expected,
        });
    }
    Ok(report)
}
