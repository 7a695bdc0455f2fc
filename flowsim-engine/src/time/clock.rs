// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! This module represents the logical clock of a simulation.
//!
//! Futures wait on the clock using [`ClockDelay`]s. The executor advances
//! the clock to the earliest registered wake time once no task can make
//! progress at the current time.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use crate::time::{TICKS_PER_SEC, Ticks};

/// How the logical clock relates to wall-clock time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Pacing {
    /// Jump straight to the next event.
    #[default]
    Virtual,

    /// Sleep for the wall-clock equivalent of each clock advance, divided by
    /// `time_scale`.
    Realtime {
        /// Speed-up factor applied to the wall-clock sleeps.
        time_scale: f64,
    },
}

pub struct TaskWaker {
    /// The Waker to use to make a task active again.
    pub waker: Waker,

    /// When a task is scheduled in the future it may be a background task
    /// that will simply run forever in which case it will set `can_exit` to
    /// true.
    pub can_exit: bool,
}

/// Shared state between futures using a Clock and the Clock itself.
pub struct ClockState {
    now: Cell<Ticks>,

    /// Used to keep wakers registered for the same time in arrival order.
    next_seq: Cell<u64>,

    /// Futures waiting for the right time, keyed by (time, registration
    /// order).
    waiting: RefCell<BTreeMap<(Ticks, u64), TaskWaker>>,

    pacing: Pacing,
}

impl ClockState {
    fn schedule(&self, until: Ticks, cx: &mut Context<'_>, can_exit: bool) -> (Ticks, u64) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.waiting.borrow_mut().insert(
            (until, seq),
            TaskWaker {
                waker: cx.waker().clone(),
                can_exit,
            },
        );
        (until, seq)
    }

    fn refresh(&self, key: (Ticks, u64), cx: &mut Context<'_>) {
        if let Some(entry) = self.waiting.borrow_mut().get_mut(&key) {
            if !entry.waker.will_wake(cx.waker()) {
                entry.waker = cx.waker().clone();
            }
        }
    }

    fn cancel(&self, key: (Ticks, u64)) {
        self.waiting.borrow_mut().remove(&key);
    }

    /// Move time on to the next registered time and return the wakers of all
    /// the futures waiting for it.
    ///
    /// Returns `None` when nothing is waiting or only background futures
    /// remain.
    pub fn advance_time(&self) -> Option<Vec<Waker>> {
        let mut waiting = self.waiting.borrow_mut();
        if waiting.values().all(|w| w.can_exit) {
            return None;
        }

        let (&(next, _), _) = waiting.first_key_value()?;
        let mut wakers = Vec::new();
        while let Some(entry) = waiting.first_entry() {
            if entry.key().0 != next {
                break;
            }
            wakers.push(entry.remove().waker);
        }
        drop(waiting);

        self.pace(next);
        self.now.set(next);
        Some(wakers)
    }

    fn pace(&self, next: Ticks) {
        if let Pacing::Realtime { time_scale } = self.pacing {
            let delta = next.saturating_sub(self.now.get());
            if delta > 0 && time_scale > 0.0 {
                let secs = delta as f64 / TICKS_PER_SEC as f64 / time_scale;
                std::thread::sleep(Duration::from_secs_f64(secs));
            }
        }
    }
}

#[derive(Clone)]
/// State representing a clock.
pub struct Clock {
    pub shared_state: Rc<ClockState>,
}

impl Clock {
    /// Create a new [Clock] using the given [`Pacing`].
    #[must_use]
    pub fn new(pacing: Pacing) -> Self {
        let shared_state = Rc::new(ClockState {
            now: Cell::new(0),
            next_seq: Cell::new(0),
            waiting: RefCell::new(BTreeMap::new()),
            pacing,
        });
        Self { shared_state }
    }

    /// Returns the current time in ticks.
    #[must_use]
    pub fn tick_now(&self) -> Ticks {
        self.shared_state.now.get()
    }

    /// Returns the time of the next event registered with this clock.
    #[must_use]
    pub fn time_of_next(&self) -> Option<Ticks> {
        self.shared_state
            .waiting
            .borrow()
            .first_key_value()
            .map(|(&(time, _), _)| time)
    }

    /// Returns the pacing mode of this clock.
    #[must_use]
    pub fn pacing(&self) -> Pacing {
        self.shared_state.pacing
    }

    /// Returns a [ClockDelay] future which must be `await`ed to delay the
    /// specified number of ticks.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks(&self, ticks: Ticks) -> ClockDelay {
        self.wait_until(self.tick_now().saturating_add(ticks))
    }

    /// Returns a [ClockDelay] future which completes once the clock reaches
    /// `until`. Completes immediately if that time has already passed.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_until(&self, until: Ticks) -> ClockDelay {
        ClockDelay {
            shared_state: self.shared_state.clone(),
            until,
            registered: None,
            can_exit: false,
        }
    }

    /// Returns a [ClockDelay] future which must be `await`ed to delay the
    /// specified number of ticks. However, if the remainder of the simulation
    /// completes then this future is allowed to not complete. This allows the
    /// user to create tasks that can run continuously as long as the rest of
    /// the simulation continues to run.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks_or_exit(&self, ticks: Ticks) -> ClockDelay {
        ClockDelay {
            shared_state: self.shared_state.clone(),
            until: self.tick_now().saturating_add(ticks),
            registered: None,
            can_exit: true,
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Pacing::Virtual)
    }
}

/// Future returned by the clock to manage advancing time using async functions.
///
/// Dropping a pending delay removes it from the clock so that an abandoned
/// timeout never moves time forward.
pub struct ClockDelay {
    shared_state: Rc<ClockState>,
    until: Ticks,
    registered: Option<(Ticks, u64)>,
    can_exit: bool,
}

impl Future for ClockDelay {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.shared_state.now.get() >= self.until {
            self.registered = None;
            return Poll::Ready(());
        }

        match self.registered {
            Some(key) => self.shared_state.refresh(key, cx),
            None => {
                let key = self.shared_state.schedule(self.until, cx, self.can_exit);
                self.registered = Some(key);
            }
        }
        Poll::Pending
    }
}

impl Drop for ClockDelay {
    fn drop(&mut self) {
        if let Some(key) = self.registered.take() {
            self.shared_state.cancel(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_waiting_does_not_advance() {
        let clock = Clock::default();
        assert!(clock.shared_state.advance_time().is_none());
        assert_eq!(clock.tick_now(), 0);
        assert_eq!(clock.time_of_next(), None);
    }
}
