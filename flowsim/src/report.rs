// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::collections::BTreeMap;
use std::fmt;

use flowsim_controller::controller::ControllerCounters;
use flowsim_engine::time::{Ticks, format_ticks};
use flowsim_traffic::task::{ErrorKind, TaskState};

use crate::results::TaskRecord;

/// The life of a run: `Init` until the control plane is ready, `Running`
/// while traffic flows, then `Completed` or `Aborted`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Init,
    Running,
    Completed,
    Aborted,
}

impl RunState {
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "INIT"),
            RunState::Running => write!(f, "RUNNING"),
            RunState::Completed => write!(f, "COMPLETED"),
            RunState::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortCause {
    /// A stop was requested.
    Stopped,
    /// Not every switch connected to the controller in time.
    ControllerNotReady { connected: usize, expected: usize },
    /// The control channel dropped mid-run.
    ControllerSessionLost,
    /// The platform could not instantiate the topology.
    PlatformFailure(String),
    /// The run hit an error it cannot carry on from, such as a result
    /// that could not be written.
    Failed(String),
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AbortCause::Stopped => write!(f, "stopped"),
            AbortCause::ControllerNotReady {
                connected,
                expected,
            } => write!(
                f,
                "controller not ready ({connected}/{expected} switches connected)"
            ),
            AbortCause::ControllerSessionLost => write!(f, "controller session lost"),
            AbortCause::PlatformFailure(msg) => write!(f, "platform failure: {msg}"),
            AbortCause::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Summary of a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub state: RunState,
    pub end_time: Ticks,
    pub generated: u64,
    pub done: usize,
    pub failed: BTreeMap<ErrorKind, usize>,
    pub abort_cause: Option<AbortCause>,
    /// Tasks cancelled by the abort, whether they had started or not.
    pub force_cancelled: usize,
    pub rules_installed: usize,
    pub misses_handled: usize,
}

impl RunReport {
    /// Count the outcomes of `records`.
    pub fn tally<'a>(&mut self, records: impl IntoIterator<Item = &'a TaskRecord>) {
        for record in records {
            match (record.state, record.error_kind) {
                (TaskState::Done, _) => self.done += 1,
                (_, Some(kind)) => *self.failed.entry(kind).or_default() += 1,
                _ => {}
            }
        }
        if self.state == RunState::Aborted {
            self.force_cancelled = self.failed_with(ErrorKind::Cancelled);
        }
    }

    pub fn set_counters(&mut self, counters: ControllerCounters) {
        self.rules_installed = counters.rules_installed;
        self.misses_handled = counters.misses_handled;
    }

    #[must_use]
    pub fn failed_with(&self, kind: ErrorKind) -> usize {
        self.failed.get(&kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.failed.values().sum()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.done + self.total_failed()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Run {} at {}", self.state, format_ticks(self.end_time))?;
        if let Some(cause) = &self.abort_cause {
            writeln!(f, "  abort cause:     {cause}")?;
            writeln!(f, "  force-cancelled: {}", self.force_cancelled)?;
        }
        writeln!(f, "  generated:       {}", self.generated)?;
        writeln!(f, "  done:            {}", self.done)?;
        writeln!(f, "  failed:          {}", self.total_failed())?;
        for (kind, count) in &self.failed {
            writeln!(f, "    {kind}: {count}")?;
        }
        write!(
            f,
            "  controller:      {} rules installed, {} table misses",
            self.rules_installed, self.misses_handled
        )
    }
}
