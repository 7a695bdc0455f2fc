// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The append-only log of task outcomes.
//!
//! Every task that reaches a terminal state produces one record, in the
//! order the tasks finished. The log is written as CSV with the columns
//!
//! ```text
//! task_id,kind,source,dest,scheduled_time,completion_time,bytes,state,error_kind
//! ```
//!
//! Times are in milliseconds of logical time and `error_kind` is empty for
//! tasks that completed.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use flowsim_engine::time::Ticks;
use flowsim_engine::types::{SimError, SimResult};
use flowsim_topology::Topology;
use flowsim_track::entity::Entity;
use flowsim_track::{Writer, debug};
use flowsim_traffic::task::{ErrorKind, Task, TaskId, TaskKind, TaskState};

pub const CSV_HEADER: &str =
    "task_id,kind,source,dest,scheduled_time,completion_time,bytes,state,error_kind";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub source: String,
    pub dest: String,
    pub scheduled_time: Ticks,
    pub completion_time: Ticks,
    pub bytes: u64,
    pub state: TaskState,
    pub error_kind: Option<ErrorKind>,
}

impl TaskRecord {
    /// Build the record of a task that has finished.
    ///
    /// Returns `None` if the task is not in a terminal state.
    #[must_use]
    pub fn from_task(task: &Task, topology: &Topology) -> Option<Self> {
        if !task.state().is_terminal() {
            return None;
        }
        Some(Self {
            task_id: task.id,
            kind: task.kind,
            source: topology.name(task.src).to_string(),
            dest: topology.name(task.dst).to_string(),
            scheduled_time: task.scheduled_time(),
            completion_time: task.completion_time()?,
            bytes: task.result().bytes,
            state: task.state(),
            error_kind: task.result().error,
        })
    }
}

/// Quote a CSV field if it needs it.
fn field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_kind = self.error_kind.map(|e| e.to_string()).unwrap_or_default();
        write!(
            f,
            "{},{},{},{},{},{},{},{},{}",
            self.task_id,
            self.kind,
            field(&self.source),
            field(&self.dest),
            self.scheduled_time,
            self.completion_time,
            self.bytes,
            self.state,
            error_kind
        )
    }
}

pub struct ResultLog {
    writer: Option<Writer>,
    records: Vec<TaskRecord>,
}

impl ResultLog {
    /// A log that only keeps its records in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            writer: None,
            records: Vec::new(),
        }
    }

    /// A log that also writes CSV to `writer`, starting with the header.
    pub fn new(mut writer: Writer) -> io::Result<Self> {
        writeln!(writer, "{CSV_HEADER}")?;
        Ok(Self {
            writer: Some(writer),
            records: Vec::new(),
        })
    }

    pub fn create(path: &Path) -> io::Result<Self> {
        let file = fs::File::create(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Unable to create {}: {e}", path.display()),
            )
        })?;
        Self::new(Box::new(BufWriter::new(file)))
    }

    /// Keep `record` and write it out. The record is kept even if the
    /// write fails.
    pub fn append(&mut self, record: TaskRecord) -> io::Result<()> {
        let written = match &mut self.writer {
            Some(writer) => writeln!(writer, "{record}"),
            None => Ok(()),
        };
        self.records.push(record);
        written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.writer {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }
}

/// Where the scheduler and the workers record finished tasks.
pub struct Recorder {
    pub entity: Rc<Entity>,
    topology: Rc<Topology>,
    log: RefCell<ResultLog>,
}

impl Recorder {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, topology: Rc<Topology>, log: ResultLog) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "results")),
            topology,
            log: RefCell::new(log),
        }
    }

    pub fn record(&self, task: &Task) -> SimResult {
        let Some(record) = TaskRecord::from_task(task, &self.topology) else {
            return Err(SimError(format!("{task} has not finished")));
        };
        debug!(self.entity ; "{record}");
        self.log
            .borrow_mut()
            .append(record)
            .map_err(|e| SimError(format!("Unable to write result: {e}")))
    }

    pub fn flush(&self) -> SimResult {
        self.log
            .borrow_mut()
            .flush()
            .map_err(|e| SimError(format!("Unable to flush results: {e}")))
    }

    #[must_use]
    pub fn records(&self) -> Vec<TaskRecord> {
        self.log.borrow().records().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use flowsim_topology::NodeId;
    use flowsim_traffic::task::Payload;

    use super::*;

    #[test]
    fn csv_lines() {
        let topology = Topology::from_dot_str("graph { h1 -- s1 -- \"h,2\" }").unwrap();
        let mut task = Task::new(
            TaskId(4),
            TaskKind::Ftp,
            100,
            NodeId(0),
            NodeId(2),
            Payload {
                target: "ftp://x/y".to_string(),
                bytes: 10,
            },
        );
        assert_eq!(TaskRecord::from_task(&task, &topology), None);

        task.start(100).unwrap();
        task.fail(250, ErrorKind::TaskTimeout).unwrap();
        let record = TaskRecord::from_task(&task, &topology).unwrap();
        assert_eq!(
            record.to_string(),
            "4,FTP,h1,\"h,2\",100,250,0,FAILED,TaskTimeout"
        );
    }
}
