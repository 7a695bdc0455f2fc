// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! An unbounded multi-producer, multi-consumer channel for passing messages
//! between tasks on the single-threaded executor.
//!
//! Values are delivered in the order they were sent. When several receivers
//! are waiting, the first one polled after a send gets the value.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::types::SimError;

struct ChannelState<T> {
    buffer: RefCell<VecDeque<T>>,
    waiting: RefCell<Vec<Waker>>,
    closed: Cell<bool>,
}

impl<T> ChannelState<T> {
    fn wake_all(&self) {
        for waker in self.waiting.borrow_mut().drain(..) {
            waker.wake();
        }
    }
}

/// The sending half of a channel.
pub struct Sender<T> {
    state: Rc<ChannelState<T>>,
}

/// The receiving half of a channel.
pub struct Receiver<T> {
    state: Rc<ChannelState<T>>,
}

/// Create a new unbounded channel.
#[must_use]
pub fn unbounded<T>() -> (Sender<T>, Receiver<T>) {
    let state = Rc::new(ChannelState {
        buffer: RefCell::new(VecDeque::new()),
        waiting: RefCell::new(Vec::new()),
        closed: Cell::new(false),
    });
    (
        Sender {
            state: state.clone(),
        },
        Receiver { state },
    )
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Sender<T> {
    /// Queue a value. Fails if the channel has been closed.
    pub fn send(&self, value: T) -> Result<(), SimError> {
        if self.state.closed.get() {
            return Err(SimError("send on a closed channel".to_string()));
        }
        self.state.buffer.borrow_mut().push_back(value);
        self.state.wake_all();
        Ok(())
    }

    /// Close the channel. Values already queued can still be received.
    pub fn close(&self) {
        self.state.closed.set(true);
        self.state.wake_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.get()
    }

    /// Number of values queued and not yet received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.buffer.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Receiver<T> {
    /// Returns a future resolving to the next value, or `None` once the
    /// channel is closed and empty.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn recv(&self) -> Recv<'_, T> {
        Recv { receiver: self }
    }

    /// Take a value without waiting.
    pub fn try_recv(&self) -> Option<T> {
        self.state.buffer.borrow_mut().pop_front()
    }

    /// Close the channel and return all values that were never received.
    pub fn close_and_drain(&self) -> Vec<T> {
        self.state.closed.set(true);
        let drained = self.state.buffer.borrow_mut().drain(..).collect();
        self.state.wake_all();
        drained
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.buffer.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Future returned by [`Receiver::recv`].
pub struct Recv<'a, T> {
    receiver: &'a Receiver<T>,
}

impl<T> Future for Recv<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let state = &self.receiver.state;
        if let Some(value) = state.buffer.borrow_mut().pop_front() {
            return Poll::Ready(Some(value));
        }
        if state.closed.get() {
            return Poll::Ready(None);
        }

        let mut waiting = state.waiting.borrow_mut();
        if !waiting.iter().any(|w| w.will_wake(cx.waker())) {
            waiting.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
