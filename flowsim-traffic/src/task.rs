// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A unit of simulated traffic.

use std::fmt;
use std::str::FromStr;

use flowsim_engine::time::Ticks;
use flowsim_topology::{NodeId, Service};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kinds of traffic, in the order used to break ties between arrivals
/// at the same time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    Http,
    Ftp,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::Http, TaskKind::Ftp];

    #[must_use]
    pub fn service(self) -> Service {
        match self {
            TaskKind::Http => Service::Http,
            TaskKind::Ftp => Service::Ftp,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskKind::Http => write!(f, "HTTP"),
            TaskKind::Ftp => write!(f, "FTP"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(TaskKind::Http),
            "ftp" => Ok(TaskKind::Ftp),
            _ => Err(format!("Unknown task kind '{s}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Done => write!(f, "DONE"),
            TaskState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why a task failed. None of these stop the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    Unreachable,
    TaskTimeout,
    Cancelled,
    ConnectionRefused,
    PlatformFailure,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::Unreachable,
        ErrorKind::TaskTimeout,
        ErrorKind::Cancelled,
        ErrorKind::ConnectionRefused,
        ErrorKind::PlatformFailure,
    ];
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Unreachable => write!(f, "Unreachable"),
            ErrorKind::TaskTimeout => write!(f, "TaskTimeout"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
            ErrorKind::ConnectionRefused => write!(f, "ConnectionRefused"),
            ErrorKind::PlatformFailure => write!(f, "PlatformFailure"),
        }
    }
}

/// What a task fetches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    /// URL of the site or file.
    pub target: String,
    /// Estimated size of the transfer.
    pub bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskResult {
    pub duration: Ticks,
    pub bytes: u64,
    pub error: Option<ErrorKind>,
}

/// Returned when a task is asked to make a transition its state does not
/// allow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidTransition {
    pub task: TaskId,
    pub from: TaskState,
    pub to: TaskState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "task {} cannot move from {} to {}",
            self.task, self.from, self.to
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    scheduled_time: Ticks,
    pub src: NodeId,
    pub dst: NodeId,
    pub payload: Payload,
    state: TaskState,
    started_time: Option<Ticks>,
    completion_time: Option<Ticks>,
    result: TaskResult,
}

impl Task {
    #[must_use]
    pub fn new(
        id: TaskId,
        kind: TaskKind,
        scheduled_time: Ticks,
        src: NodeId,
        dst: NodeId,
        payload: Payload,
    ) -> Self {
        Self {
            id,
            kind,
            scheduled_time,
            src,
            dst,
            payload,
            state: TaskState::Pending,
            started_time: None,
            completion_time: None,
            result: TaskResult::default(),
        }
    }

    #[must_use]
    pub fn scheduled_time(&self) -> Ticks {
        self.scheduled_time
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[must_use]
    pub fn started_time(&self) -> Option<Ticks> {
        self.started_time
    }

    #[must_use]
    pub fn completion_time(&self) -> Option<Ticks> {
        self.completion_time
    }

    #[must_use]
    pub fn result(&self) -> &TaskResult {
        &self.result
    }

    fn transition(&mut self, to: TaskState) -> Result<(), InvalidTransition> {
        let allowed = matches!(
            (self.state, to),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending, TaskState::Failed)
                | (TaskState::Running, TaskState::Done)
                | (TaskState::Running, TaskState::Failed)
        );
        if !allowed {
            return Err(InvalidTransition {
                task: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// PENDING to RUNNING.
    pub fn start(&mut self, now: Ticks) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Running)?;
        self.started_time = Some(now);
        Ok(())
    }

    /// RUNNING to DONE.
    pub fn complete(&mut self, now: Ticks, bytes: u64) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Done)?;
        self.finish(now, bytes, None);
        Ok(())
    }

    /// PENDING or RUNNING to FAILED.
    pub fn fail(&mut self, now: Ticks, error: ErrorKind) -> Result<(), InvalidTransition> {
        self.transition(TaskState::Failed)?;
        self.finish(now, 0, Some(error));
        Ok(())
    }

    fn finish(&mut self, now: Ticks, bytes: u64, error: Option<ErrorKind>) {
        self.completion_time = Some(now);
        self.result = TaskResult {
            duration: now.saturating_sub(self.started_time.unwrap_or(now)),
            bytes,
            error,
        };
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} task {} at {}ms {} -> {} ({})",
            self.kind, self.id, self.scheduled_time, self.src, self.dst, self.payload.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            TaskId(1),
            TaskKind::Http,
            100,
            NodeId(0),
            NodeId(1),
            Payload {
                target: "https://example.com".to_string(),
                bytes: 10,
            },
        )
    }

    #[test]
    fn success_path() {
        let mut task = task();
        task.start(120).unwrap();
        task.complete(150, 10).unwrap();
        assert_eq!(task.state(), TaskState::Done);
        assert_eq!(task.result().duration, 30);
        assert_eq!(task.completion_time(), Some(150));
        assert_eq!(task.scheduled_time(), 100);
    }

    #[test]
    fn fast_failure_skips_running() {
        let mut task = task();
        task.fail(100, ErrorKind::Unreachable).unwrap();
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.result().duration, 0);
        assert_eq!(task.result().error, Some(ErrorKind::Unreachable));
    }

    #[test]
    fn invalid_transitions() {
        let mut task = task();
        assert_eq!(
            task.complete(1, 0),
            Err(InvalidTransition {
                task: TaskId(1),
                from: TaskState::Pending,
                to: TaskState::Done,
            })
        );
        task.start(1).unwrap();
        assert!(task.start(2).is_err());
        task.fail(3, ErrorKind::TaskTimeout).unwrap();
        assert!(task.fail(4, ErrorKind::Cancelled).is_err());
        assert!(task.complete(4, 0).is_err());
    }
}
