// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The time-ordered queue of tasks that have not fired yet.
//!
//! Tasks are ordered by scheduled time and then by id, which is their
//! creation order, so tasks due at the same time come out first in, first
//! out.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use flowsim_engine::time::Ticks;

use crate::task::{Task, TaskId, TaskState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// Only PENDING tasks can be queued.
    InvalidState { task: TaskId, state: TaskState },
    /// The queue has been closed by a stop.
    Closed,
    /// A task with the same id is already queued for the same time.
    Duplicate(TaskId),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueError::InvalidState { task, state } => {
                write!(f, "task {task} is {state} and cannot be queued")
            }
            QueueError::Closed => write!(f, "task queue is closed"),
            QueueError::Duplicate(task) => write!(f, "task {task} is already queued"),
        }
    }
}

impl std::error::Error for QueueError {}

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: BTreeMap<(Ticks, TaskId), Task>,
    closed: bool,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, task: Task) -> Result<(), QueueError> {
        if self.closed {
            return Err(QueueError::Closed);
        }
        if task.state() != TaskState::Pending {
            return Err(QueueError::InvalidState {
                task: task.id,
                state: task.state(),
            });
        }
        match self.tasks.entry((task.scheduled_time(), task.id)) {
            Entry::Occupied(_) => Err(QueueError::Duplicate(task.id)),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(())
            }
        }
    }

    /// Remove and return every task due at or before `now`, in order.
    pub fn dequeue_due(&mut self, now: Ticks) -> Vec<Task> {
        let mut due = Vec::new();
        while let Some(entry) = self.tasks.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    #[must_use]
    pub fn peek_next_time(&self) -> Option<Ticks> {
        self.tasks.first_key_value().map(|((time, _), _)| *time)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Reject any further tasks.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Remove every remaining task, in order.
    pub fn drain(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.tasks).into_values().collect()
    }
}
