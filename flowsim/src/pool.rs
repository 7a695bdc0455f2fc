// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A bounded pool of workers executing tasks on the emulation platform.
//!
//! Tasks are admitted through an admission queue which the workers pull
//! from, so the scheduler never waits for a free worker. Each execution is
//! bounded by the per-task timeout and, once the pool is cancelled, by the
//! cancellation deadline.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use flowsim_emulation::platform::{EmulationPlatform, Exchange, ExchangeError};
use flowsim_engine::channel::{Receiver, Sender, unbounded};
use flowsim_engine::engine::Engine;
use flowsim_engine::events::once::Once;
use flowsim_engine::events::repeated::{Repeated, RepeatedFuture};
use flowsim_engine::time::Ticks;
use flowsim_engine::time::clock::Clock;
use flowsim_engine::traits::Runnable;
use flowsim_engine::types::{SimError, SimResult};
use flowsim_track::entity::Entity;
use flowsim_track::{debug, error, trace, warn};
use flowsim_traffic::task::{ErrorKind, Task};
use futures::future::{Either, select};

use crate::results::Recorder;

pub struct WorkerPool {
    pub entity: Rc<Entity>,
    size: usize,
    tx: Sender<Task>,
    rx: Receiver<Task>,

    /// Tasks admitted and not yet recorded.
    outstanding: Cell<usize>,
    busy: Cell<usize>,

    /// Notified whenever a worker finishes a task.
    activity: Repeated,

    /// Carries the tick at which unfinished tasks are cancelled.
    cancel: Once<Ticks>,

    /// The first error a worker could not recover from.
    failure: RefCell<Option<SimError>>,
}

impl fmt::Display for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.entity)
    }
}

impl WorkerPool {
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        size: usize,
        task_timeout: Ticks,
        platform: Rc<dyn EmulationPlatform>,
        recorder: Rc<Recorder>,
    ) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, "pool"));
        let (tx, rx) = unbounded();
        let pool = Rc::new(Self {
            entity,
            size,
            tx,
            rx,
            outstanding: Cell::new(0),
            busy: Cell::new(0),
            activity: Repeated::new(),
            cancel: Once::new(),
            failure: RefCell::new(None),
        });

        for i in 0..size {
            let worker = Rc::new(Worker {
                entity: Rc::new(Entity::new(&pool.entity, &format!("worker{i}"))),
                pool: pool.clone(),
                clock: engine.clock(),
                task_timeout,
                platform: platform.clone(),
                recorder: recorder.clone(),
            });
            engine.register(worker);
        }
        pool
    }

    /// Queue a task for the next free worker.
    pub fn admit(&self, task: Task) -> SimResult {
        trace!(self.entity ; "admit {task}");
        self.tx.send(task)?;
        self.outstanding.set(self.outstanding.get() + 1);
        Ok(())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks admitted whose outcome has not been recorded yet.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    #[must_use]
    pub fn busy(&self) -> usize {
        self.busy.get()
    }

    /// Completes the next time a worker finishes a task.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn activity(&self) -> RepeatedFuture {
        self.activity.wait()
    }

    /// Close the admission queue and hand back the tasks that never
    /// started.
    pub fn drain_waiting(&self) -> Vec<Task> {
        let tasks = self.rx.close_and_drain();
        self.outstanding
            .set(self.outstanding.get().saturating_sub(tasks.len()));
        tasks
    }

    /// Give running tasks until `deadline` to finish.
    pub fn cancel(&self, deadline: Ticks) {
        if self.cancel.notify_if_first(deadline) {
            debug!(self.entity ; "{} running tasks cancelled at {}ms", self.busy(), deadline);
        }
    }

    /// Stop the workers once they are idle.
    pub fn close(&self) {
        self.tx.close();
    }

    /// Take the error a worker hit, if any. The run cannot carry on after
    /// one.
    pub fn take_failure(&self) -> Option<SimError> {
        self.failure.borrow_mut().take()
    }

    fn fail(&self, e: SimError) {
        error!(self.entity ; "{e}");
        self.failure.borrow_mut().get_or_insert(e);
    }

    fn finished(&self) {
        self.busy.set(self.busy.get().saturating_sub(1));
        self.outstanding
            .set(self.outstanding.get().saturating_sub(1));
        self.activity.notify();
    }
}

struct Worker {
    entity: Rc<Entity>,
    pool: Rc<WorkerPool>,
    clock: Clock,
    task_timeout: Ticks,
    platform: Rc<dyn EmulationPlatform>,
    recorder: Rc<Recorder>,
}

async fn cancelled(cancel: Once<Ticks>, clock: Clock) {
    let deadline = cancel.wait().await;
    clock.wait_until(deadline).await;
}

fn error_kind(worker: &Worker, error: ExchangeError) -> ErrorKind {
    match error {
        ExchangeError::Unreachable => ErrorKind::Unreachable,
        ExchangeError::ConnectionRefused => ErrorKind::ConnectionRefused,
        ExchangeError::Platform(msg) => {
            warn!(worker.entity ; "platform failure: {msg}");
            ErrorKind::PlatformFailure
        }
    }
}

impl Worker {
    async fn execute(&self, mut task: Task) -> Result<Task, SimError> {
        task.start(self.clock.tick_now())
            .map_err(|e| SimError(e.to_string()))?;
        debug!(self.entity ; "start {task}");

        let exchange = Exchange {
            id: task.id.0,
            service: task.kind.service(),
            src: task.src,
            dst: task.dst,
            bytes: task.payload.bytes,
        };
        let execute = self.platform.execute(exchange);
        let timeout = self.clock.wait_ticks(self.task_timeout);
        let cancel = Box::pin(cancelled(self.pool.cancel.clone(), self.clock.clone()));

        let outcome = match select(execute, select(timeout, cancel)).await {
            Either::Left((Ok(transfer), _)) => Ok(transfer.bytes),
            Either::Left((Err(e), _)) => Err(error_kind(self, e)),
            Either::Right((Either::Left(_), _)) => Err(ErrorKind::TaskTimeout),
            Either::Right((Either::Right(_), _)) => Err(ErrorKind::Cancelled),
        };

        let now = self.clock.tick_now();
        let finished = match outcome {
            Ok(bytes) => task.complete(now, bytes),
            Err(kind) => task.fail(now, kind),
        };
        finished.map_err(|e| SimError(e.to_string()))?;
        debug!(self.entity ; "{} {}", task.state(), task);
        Ok(task)
    }
}

#[async_trait(?Send)]
impl Runnable for Worker {
    async fn run(&self) -> SimResult {
        while let Some(task) = self.pool.rx.recv().await {
            self.pool.busy.set(self.pool.busy.get() + 1);
            let recorded = match self.execute(task).await {
                Ok(task) => self.recorder.record(&task),
                Err(e) => Err(e),
            };
            if let Err(e) = recorded {
                self.pool.fail(e);
            }
            self.pool.finished();
        }
        trace!(self.entity ; "idle and closed");
        Ok(())
    }
}
