// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;

use crate::tracker::{EntityManager, Track};
use crate::{Id, Writer};

/// A simple text tracker to output messages to a [`Writer`].
///
/// Writes are best effort: a failing writer never stops a simulation.
pub struct TextTracker {
    entity_manager: EntityManager,

    /// Writer to which all _log_ events will be written.
    writer: RefCell<Writer>,
}

impl TextTracker {
    /// Create a new [`TextTracker`] with an [`EntityManager`].
    #[must_use]
    pub fn new(entity_manager: EntityManager, writer: Writer) -> Self {
        Self {
            entity_manager,
            writer: RefCell::new(writer),
        }
    }

    fn write_line(&self, line: fmt::Arguments) {
        let _ = writeln!(self.writer.borrow_mut(), "{line}");
    }
}

/// Implementation for each [`Track`] event
impl Track for TextTracker {
    fn unique_id(&self) -> Id {
        self.entity_manager.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.entity_manager.is_log_enabled_at_level(id, level)
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        self.entity_manager.add_entity(id, entity_name);
    }

    fn enter(&self, id: Id, object: Id) {
        self.write_line(format_args!("{id}: enter {object}"));
    }

    fn exit(&self, id: Id, object: Id) {
        self.write_line(format_args!("{id}: exit {object}"));
    }

    fn create(&self, created_by: Id, id: Id, num_bytes: usize, name: &str) {
        self.write_line(format_args!(
            "{created_by}: created {id}, {name}, {num_bytes} bytes"
        ));
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.write_line(format_args!("{destroyed_by}: destroyed {id}"));
    }

    fn log(&self, id: Id, level: log::Level, msg: fmt::Arguments) {
        self.write_line(format_args!("{id}:{level}: {msg}"));
    }

    fn time(&self, set_by: Id, now: u64) {
        if now != self.entity_manager.time() {
            self.entity_manager.set_time(now);
            self.write_line(format_args!("{set_by}: set time to {now}ms"));
        }
    }

    fn shutdown(&self) {
        let _ = self.writer.borrow_mut().flush();
    }
}
