// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use flowsim_engine::channel::unbounded;
use flowsim_engine::test_helpers::start_test;

#[test]
fn values_arrive_in_order() {
    let mut engine = start_test(file!());
    let (tx, rx) = unbounded();
    let received = Rc::new(RefCell::new(Vec::new()));

    {
        let received = received.clone();
        engine.spawn(async move {
            while let Some(value) = rx.recv().await {
                received.borrow_mut().push(value);
            }
            Ok(())
        });
    }
    {
        let clock = engine.clock();
        engine.spawn(async move {
            for i in 0..4 {
                tx.send(i)?;
                clock.wait_ticks(1).await;
            }
            tx.close();
            Ok(())
        });
    }

    engine.run().unwrap();
    assert_eq!(*received.borrow(), vec![0, 1, 2, 3]);
}

#[test]
fn multiple_receivers_share_work() {
    let mut engine = start_test(file!());
    let (tx, rx) = unbounded();
    let received = Rc::new(RefCell::new(Vec::new()));

    for worker in 0..2 {
        let rx = rx.clone();
        let received = received.clone();
        let clock = engine.clock();
        engine.spawn(async move {
            while let Some(value) = rx.recv().await {
                received.borrow_mut().push((worker, value));
                clock.wait_ticks(10).await;
            }
            Ok(())
        });
    }

    for i in 0..4 {
        tx.send(i).unwrap();
    }
    tx.close();

    engine.run().unwrap();
    let received = received.borrow();
    assert_eq!(received.len(), 4);
    let mut values: Vec<_> = received.iter().map(|(_, v)| *v).collect();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2, 3]);

    // Two workers each taking 10 ticks per value
    assert_eq!(engine.tick_now(), 20);
}

#[test]
fn closed_channel_rejects_sends_and_drains() {
    let (tx, rx) = unbounded();
    tx.send(1).unwrap();
    tx.send(2).unwrap();
    assert_eq!(rx.len(), 2);

    assert_eq!(rx.close_and_drain(), vec![1, 2]);
    assert!(tx.is_closed());
    assert!(tx.send(3).is_err());
    assert!(rx.is_empty());
}
