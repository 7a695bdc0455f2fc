// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Logical time.
//!
//! The simulation runs against a single logical [clock](crate::time::clock)
//! whose tick is one millisecond. Helpers are provided to convert the
//! seconds used in configuration into ticks.

pub mod clock;

/// A point in, or span of, logical time measured in clock ticks.
pub type Ticks = u64;

/// Number of clock ticks in one second of logical time.
pub const TICKS_PER_SEC: Ticks = 1000;

/// Convert a number of seconds into the nearest number of [`Ticks`].
///
/// Negative values are clamped to zero.
#[must_use]
pub fn secs_to_ticks(secs: f64) -> Ticks {
    if secs <= 0.0 {
        0
    } else {
        (secs * TICKS_PER_SEC as f64).round() as Ticks
    }
}

/// Convert [`Ticks`] into seconds.
#[must_use]
pub fn ticks_to_secs(ticks: Ticks) -> f64 {
    ticks as f64 / TICKS_PER_SEC as f64
}

/// Format a logical time as `MM:SS.ss`.
#[must_use]
pub fn format_ticks(ticks: Ticks) -> String {
    let secs = ticks_to_secs(ticks);
    let minutes = (secs / 60.0).floor();
    let seconds = secs - minutes * 60.0;
    format!("{:02}:{:05.2}", minutes as u64, seconds)
}
