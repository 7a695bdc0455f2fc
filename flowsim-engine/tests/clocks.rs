// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::pin::pin;
use std::rc::Rc;

use flowsim_engine::test_helpers::start_test;
use futures::future::{Either, select};

#[test]
fn waits_complete_in_time_order() {
    let mut engine = start_test(file!());
    let seen = Rc::new(RefCell::new(Vec::new()));

    for (id, delay) in [(1, 30), (2, 10), (3, 20), (4, 10)] {
        let clock = engine.clock();
        let seen = seen.clone();
        engine.spawn(async move {
            clock.wait_ticks(delay).await;
            seen.borrow_mut().push((id, clock.tick_now()));
            Ok(())
        });
    }

    engine.run().unwrap();
    assert_eq!(*seen.borrow(), vec![(2, 10), (4, 10), (3, 20), (1, 30)]);
    assert_eq!(engine.tick_now(), 30);
}

#[test]
fn abandoned_timeout_does_not_advance_time() {
    let mut engine = start_test(file!());
    let clock = engine.clock();

    engine.spawn(async move {
        let short = clock.wait_ticks(5);
        let long = clock.wait_ticks(1000);
        match select(pin!(short), pin!(long)).await {
            Either::Left(_) => Ok(()),
            Either::Right(_) => panic!("long delay should lose"),
        }
    });

    engine.run().unwrap();
    assert_eq!(engine.tick_now(), 5);
}

#[test]
fn background_waits_do_not_keep_the_run_alive() {
    let mut engine = start_test(file!());
    let ticks_seen = Rc::new(RefCell::new(0));

    {
        let clock = engine.clock();
        let ticks_seen = ticks_seen.clone();
        engine.spawn(async move {
            loop {
                clock.wait_ticks_or_exit(10).await;
                *ticks_seen.borrow_mut() += 1;
            }
        });
    }
    {
        let clock = engine.clock();
        engine.spawn(async move {
            clock.wait_ticks(35).await;
            Ok(())
        });
    }

    engine.run().unwrap();
    assert_eq!(engine.tick_now(), 35);
    assert_eq!(*ticks_seen.borrow(), 3);
}

#[test]
fn wait_until_in_the_past_is_immediate() {
    let mut engine = start_test(file!());
    let clock = engine.clock();

    engine.spawn(async move {
        clock.wait_ticks(100).await;
        clock.wait_until(50).await;
        assert_eq!(clock.tick_now(), 100);
        Ok(())
    });

    engine.run().unwrap();
    assert_eq!(engine.tick_now(), 100);
}

#[test]
fn errors_stop_the_run() {
    let mut engine = start_test(file!());
    let clock = engine.clock();

    engine.spawn(async move {
        clock.wait_ticks(7).await;
        flowsim_engine::sim_error!("stopped")
    });

    let result = engine.run();
    assert_eq!(format!("{}", result.unwrap_err()), "Error: stopped");
}
