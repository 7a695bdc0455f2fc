// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use flowsim_track::entity::Entity;
use flowsim_track::set_time;

use crate::time::Ticks;
use crate::time::clock::Clock;
use crate::types::SimResult;

unsafe fn drop_raw_waker(data: *const ()) {
    unsafe {
        drop(Rc::from_raw(data as *const Task));
    }
}

const VTABLE: RawWakerVTable =
    RawWakerVTable::new(clone_raw_waker, wake_task, wake_task_by_ref, drop_raw_waker);

fn task_raw_waker(task: Rc<Task>) -> RawWaker {
    let ptr = Rc::into_raw(task) as *const ();
    RawWaker::new(ptr, &VTABLE)
}

fn waker_for_task(task: Rc<Task>) -> Waker {
    unsafe { Waker::from_raw(task_raw_waker(task)) }
}

unsafe fn clone_raw_waker(data: *const ()) -> RawWaker {
    unsafe {
        // Tasks are always wrapped in a reference counter to allow them to be shared
        // read-only.
        Rc::increment_strong_count(data as *const Task);
    }
    RawWaker::new(data, &VTABLE)
}

unsafe fn wake_task(data: *const ()) {
    unsafe {
        // Consumes the reference held by the waker.
        let rc_task = Rc::from_raw(data as *const Task);
        rc_task.executor_state.new_tasks.borrow_mut().push(rc_task.clone());
    }
}

unsafe fn wake_task_by_ref(data: *const ()) {
    unsafe {
        Rc::increment_strong_count(data as *const Task);
        wake_task(data);
    }
}

type TaskFuture = Pin<Box<dyn Future<Output = SimResult>>>;

struct Task {
    /// `None` once the future has completed. Stale wakers can still push a
    /// completed task back onto the queue and it is then ignored.
    future: RefCell<Option<TaskFuture>>,
    executor_state: Rc<ExecutorState>,
}

impl Task {
    fn new(
        future: impl Future<Output = SimResult> + 'static,
        executor_state: Rc<ExecutorState>,
    ) -> Task {
        Task {
            future: RefCell::new(Some(Box::pin(future))),
            executor_state,
        }
    }

    fn poll(&self, context: &mut Context) -> Poll<SimResult> {
        let mut slot = self.future.borrow_mut();
        let Some(future) = slot.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = future.as_mut().poll(context);
        if result.is_ready() {
            *slot = None;
        }
        result
    }
}

struct ExecutorState {
    task_queue: RefCell<Vec<Rc<Task>>>,
    new_tasks: RefCell<Vec<Rc<Task>>>,
    clock: Clock,
}

/// Single-threaded executor
///
/// This is a thin-wrapper (using [`Rc`]) around the real executor, so that this
/// struct can be cloned and passed around.
///
/// The executor polls every task that has been woken. Once no task is left
/// to poll it advances the [`Clock`] to the next time a task is waiting for
/// and wakes those tasks. The run ends when no task is runnable and no
/// foreground task is waiting on the clock.
#[derive(Clone)]
pub struct Executor {
    pub entity: Rc<Entity>,
    state: Rc<ExecutorState>,
}

impl Executor {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.state
            .new_tasks
            .borrow_mut()
            .push(Rc::new(Task::new(future, self.state.clone())));
    }

    pub fn run(&self, finished: &Rc<Cell<bool>>) -> SimResult {
        loop {
            self.step(finished)?;
            if finished.get() {
                break;
            }

            if self.state.new_tasks.borrow().is_empty() {
                let next = self.state.clock.shared_state.advance_time();
                if let Some(wakers) = next {
                    set_time!(self.entity ; self.state.clock.tick_now());
                    for waker in wakers {
                        waker.wake();
                    }
                } else {
                    // No events left
                    break;
                }
            }
        }
        Ok(())
    }

    pub fn step(&self, finished: &Rc<Cell<bool>>) -> SimResult {
        // Append new tasks created since the last step into the task queue
        let mut task_queue = self.state.task_queue.borrow_mut();
        task_queue.append(&mut self.state.new_tasks.borrow_mut());

        // Loop over all tasks, polling them. A task that is not ready will
        // have parked its waker somewhere.
        for task in task_queue.drain(..) {
            if finished.get() {
                break;
            }

            let waker = waker_for_task(task.clone());
            let mut context = Context::from_waker(&waker);

            if let Poll::Ready(Err(e)) = task.poll(&mut context) {
                // Error - return early
                return Err(e);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.state.clock.clone()
    }

    #[must_use]
    pub fn tick_now(&self) -> Ticks {
        self.state.clock.tick_now()
    }
}

/// `Spawner` spawns new futures into the executor.
#[derive(Clone)]
pub struct Spawner {
    state: Rc<ExecutorState>,
}

impl Spawner {
    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.state
            .new_tasks
            .borrow_mut()
            .push(Rc::new(Task::new(future, self.state.clone())));
    }
}

pub fn new_executor_and_spawner(top: &Rc<Entity>, clock: Clock) -> (Executor, Spawner) {
    let state = Rc::new(ExecutorState {
        task_queue: RefCell::new(Vec::new()),
        new_tasks: RefCell::new(Vec::new()),
        clock,
    });
    let entity = Rc::new(Entity::new(top, "executor"));
    (
        Executor {
            entity,
            state: state.clone(),
        },
        Spawner { state },
    )
}
