// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Ensure that all version of each macro can be used

use std::rc::Rc;

use flowsim_track::entity::{Entity, toplevel};
use flowsim_track::{
    Id, create, create_id, debug, destroy, enter, error, exit, info, set_time, test_helpers,
    test_init, trace, warn,
};

macro_rules! build_with_entity {
    ($name:ident, $macro:ident, $slvl:expr) => (
        #[test]
        fn $name() {
            let (test_tracker, tracker) = test_init!(100);

            let top = toplevel(&tracker, "top");
            test_helpers::check_and_clear(&test_tracker, &["0: created 100, top, 0 bytes"]);
            assert_eq!(top.id, Id(100));

            $macro!(top ; "Loc with no args");
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with no args")]);

            $macro!(top ; "Loc with {} argument", 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl, ": Loc with 1 argument")]);

            $macro!(top ; "Loc with {}, {} arguments", 1, 1 + 1);
            test_helpers::check_and_clear(&test_tracker, &[concat!("100:", $slvl,": Loc with 1, 2 arguments")]);

            drop(top);
            test_helpers::check_and_clear(&test_tracker, &["0: destroyed 100"]);
        }
    );
}

build_with_entity!(trace_with_entity, trace, "TRACE");
build_with_entity!(info_with_entity, info, "INFO");
build_with_entity!(debug_with_entity, debug, "DEBUG");
build_with_entity!(warn_with_entity, warn, "WARN");
build_with_entity!(error_with_entity, error, "ERROR");

#[test]
fn child_entities() {
    let (test_tracker, tracker) = test_init!(10);

    let top = toplevel(&tracker, "top");
    let controller = Rc::new(Entity::new(&top, "controller"));
    let worker = Entity::new(&controller, "worker0");
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 10, top, 0 bytes",
            "10: created 11, top::controller, 0 bytes",
            "11: created 12, top::controller::worker0, 0 bytes",
        ],
    );

    assert_eq!(worker.full_name(), "top::controller::worker0");
    assert_eq!(format!("{worker}"), "top::controller::worker0");

    drop(worker);
    test_helpers::check_and_clear(&test_tracker, &["11: destroyed 12"]);
}

#[test]
fn create_destroy_objects() {
    let (test_tracker, tracker) = test_init!(40);

    let top = toplevel(&tracker, "top");
    let obj = create_id!(top);
    create!(top ; obj, 1024, "task-1");
    enter!(top ; obj);
    exit!(top ; obj);
    destroy!(top ; obj);
    test_helpers::check_and_clear(
        &test_tracker,
        &[
            "0: created 40, top, 0 bytes",
            "40: created 41, task-1, 1024 bytes",
            "40: 41 entered",
            "40: 41 exited",
            "40: destroyed 41",
        ],
    );
}

#[test]
fn time_updates() {
    let (test_tracker, tracker) = test_init!(1);

    let top = toplevel(&tracker, "top");
    set_time!(top ; 250);
    test_helpers::check_and_clear(
        &test_tracker,
        &["0: created 1, top, 0 bytes", "1: set time to 250ms"],
    );
}
