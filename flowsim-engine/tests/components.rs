// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use flowsim_engine::test_helpers::start_test;
use flowsim_engine::time::clock::Clock;
use flowsim_engine::traits::Runnable;
use flowsim_engine::types::SimResult;

struct Ticker {
    clock: Clock,
    period: u64,
    count: Cell<usize>,
}

#[async_trait(?Send)]
impl Runnable for Ticker {
    async fn run(&self) -> SimResult {
        for _ in 0..3 {
            self.clock.wait_ticks(self.period).await;
            self.count.set(self.count.get() + 1);
        }
        Ok(())
    }
}

struct Idle;

impl Runnable for Idle {}

#[test]
fn registered_components_run() {
    let mut engine = start_test(file!());
    let ticker = Rc::new(Ticker {
        clock: engine.clock(),
        period: 10,
        count: Cell::new(0),
    });
    engine.register(ticker.clone());
    engine.register(Rc::new(Idle));

    engine.run().unwrap();
    assert_eq!(ticker.count.get(), 3);
    assert_eq!(engine.tick_now(), 30);
}
