// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! An event that can only be triggered once

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::future::FusedFuture;

use crate::sim_error;
use crate::types::SimResult;

pub struct OnceState<T>
where
    T: Copy,
{
    listen_waiting: RefCell<Vec<Waker>>,
    result: Cell<Option<T>>,
}

impl<T> OnceState<T>
where
    T: Copy,
{
    fn new() -> Self {
        Self {
            listen_waiting: RefCell::new(Vec::new()),
            result: Cell::new(None),
        }
    }
}

/// An event that is triggered at most once with a value.
///
/// Listeners that start after the event has been triggered complete
/// immediately.
#[derive(Clone)]
pub struct Once<T>
where
    T: Copy,
{
    state: Rc<OnceState<T>>,
}

pub struct OnceFuture<T>
where
    T: Copy,
{
    state: Rc<OnceState<T>>,
    done: bool,
}

impl<T> FusedFuture for OnceFuture<T>
where
    T: Copy,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T> Once<T>
where
    T: Copy,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(OnceState::new()),
        }
    }

    /// Trigger the event, waking all listeners.
    ///
    /// Returns an error if the event has already been triggered.
    pub fn notify(&self, value: T) -> SimResult {
        if self.is_triggered() {
            sim_error!("once event already triggered")
        }
        self.state.result.set(Some(value));
        for waker in self.state.listen_waiting.borrow_mut().drain(..) {
            waker.wake();
        }
        Ok(())
    }

    /// Trigger the event unless it has already been triggered.
    ///
    /// Returns whether this call triggered the event.
    pub fn notify_if_first(&self, value: T) -> bool {
        if self.is_triggered() {
            false
        } else {
            self.state.result.set(Some(value));
            for waker in self.state.listen_waiting.borrow_mut().drain(..) {
                waker.wake();
            }
            true
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.state.result.get().is_some()
    }

    /// The value the event was triggered with, if any.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.state.result.get()
    }

    /// Returns a future that completes once the event has been triggered.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait(&self) -> OnceFuture<T> {
        OnceFuture {
            state: self.state.clone(),
            done: false,
        }
    }
}

impl<T> Default for Once<T>
where
    T: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Future for OnceFuture<T>
where
    T: Copy,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.state.result.get() {
            Some(value) => {
                self.done = true;
                Poll::Ready(value)
            }
            None => {
                let mut waiting = self.state.listen_waiting.borrow_mut();
                if !waiting.iter().any(|w| w.will_wake(cx.waker())) {
                    waiting.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
