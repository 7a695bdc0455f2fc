// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use flowsim_engine::events::once::Once;
use flowsim_engine::events::repeated::Repeated;
use flowsim_engine::test_helpers::start_test;

#[test]
fn once_wakes_all_listeners() {
    let mut engine = start_test(file!());
    let once = Once::new();
    let seen = Rc::new(RefCell::new(Vec::new()));

    for i in 0..3 {
        let once = once.clone();
        let seen = seen.clone();
        engine.spawn(async move {
            let value = once.wait().await;
            seen.borrow_mut().push((i, value));
            Ok(())
        });
    }
    {
        let clock = engine.clock();
        let once = once.clone();
        engine.spawn(async move {
            clock.wait_ticks(20).await;
            once.notify(42)
        });
    }

    engine.run().unwrap();
    assert_eq!(*seen.borrow(), vec![(0, 42), (1, 42), (2, 42)]);
    assert_eq!(once.value(), Some(42));
}

#[test]
fn once_can_only_be_notified_once() {
    let once = Once::new();
    assert!(once.notify(1).is_ok());
    assert!(once.notify(2).is_err());
    assert!(!once.notify_if_first(3));
    assert_eq!(once.value(), Some(1));
}

#[test]
fn late_listener_completes_immediately() {
    let mut engine = start_test(file!());
    let once = Once::new();
    once.notify(()).unwrap();

    let clock = engine.clock();
    engine.spawn(async move {
        once.wait().await;
        assert_eq!(clock.tick_now(), 0);
        Ok(())
    });
    engine.run().unwrap();
}

#[test]
fn repeated_counts_each_notification() {
    let mut engine = start_test(file!());
    let repeated = Repeated::new();
    let count = Rc::new(RefCell::new(0));

    {
        let repeated = repeated.clone();
        let count = count.clone();
        engine.spawn(async move {
            for _ in 0..3 {
                repeated.wait().await;
                *count.borrow_mut() += 1;
            }
            Ok(())
        });
    }
    {
        let clock = engine.clock();
        engine.spawn(async move {
            for _ in 0..3 {
                clock.wait_ticks(10).await;
                repeated.notify();
            }
            Ok(())
        });
    }

    engine.run().unwrap();
    assert_eq!(*count.borrow(), 3);
    assert_eq!(engine.tick_now(), 30);
}
