// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! An event that can be triggered multiple times.
//!
//! Each call to `listen()` waits for the next notification after the call was
//! made, so a notification is never seen twice by the same listener.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};


struct RepeatedState {
    listen_waiting: RefCell<Vec<Waker>>,
    generation: Cell<u64>,
}

#[derive(Clone)]
pub struct Repeated {
    state: Rc<RepeatedState>,
}

pub struct RepeatedFuture {
    state: Rc<RepeatedState>,
    seen: u64,
}

impl Repeated {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RepeatedState {
                listen_waiting: RefCell::new(Vec::new()),
                generation: Cell::new(0),
            }),
        }
    }

    pub fn notify(&self) {
        self.state.generation.set(self.state.generation.get() + 1);
        for waker in self.state.listen_waiting.borrow_mut().drain(..) {
            waker.wake();
        }
    }

    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait(&self) -> RepeatedFuture {
        RepeatedFuture {
            state: self.state.clone(),
            seen: self.state.generation.get(),
        }
    }
}

impl Default for Repeated {
    fn default() -> Self {
        Self::new()
    }
}

impl Future for RepeatedFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.generation.get() != self.seen {
            Poll::Ready(())
        } else {
            let mut waiting = self.state.listen_waiting.borrow_mut();
            if !waiting.iter().any(|w| w.will_wake(cx.waker())) {
                waiting.push(cx.waker().clone());
            }
            Poll::Pending
        }
    }
}
