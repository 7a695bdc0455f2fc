// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Diurnal traffic profile.
//!
//! The profile is a CSV file of `timestamp_secs,packet_count` rows after a
//! header row. Values between samples are interpolated linearly and the
//! profile repeats every 24 hours.

use std::fs;
use std::path::Path;

use flowsim_engine::time::{Ticks, ticks_to_secs};
use rand::Rng;

use crate::error::TrafficError;

pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Width of the bins that count mode spreads arrivals over.
pub const BIN_TICKS: Ticks = 100;

/// Relative amplitude of the noise added to each bin.
const NOISE_FRACTION: f64 = 0.05;

#[derive(Clone, Debug, PartialEq)]
pub struct TrafficProfile {
    /// Samples sorted by time of day, with times in `[0, SECONDS_PER_DAY)`.
    points: Vec<(f64, f64)>,
}

impl TrafficProfile {
    pub fn from_file(profile_file: &Path) -> Result<Self, TrafficError> {
        let profile_str = fs::read_to_string(profile_file).map_err(|e| {
            TrafficError::Io(format!("Unable to read {}: {e}", profile_file.display()))
        })?;
        Self::from_csv_str(&profile_str).map_err(|e| match e {
            TrafficError::Io(msg) => {
                TrafficError::Io(format!("Unable to parse {}: {msg}", profile_file.display()))
            }
            other => other,
        })
    }

    pub fn from_csv_str(s: &str) -> Result<Self, TrafficError> {
        let mut points = Vec::new();
        for (index, line) in s.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = index + 1;
            let mut fields = line.split(',').map(str::trim);
            let (Some(time), Some(count)) = (fields.next(), fields.next()) else {
                return Err(TrafficError::Io(format!(
                    "line {line_no}: expected timestamp_secs,packet_count"
                )));
            };
            let time: f64 = time
                .parse()
                .map_err(|e| TrafficError::Io(format!("line {line_no}: bad timestamp: {e}")))?;
            let count: f64 = count
                .parse()
                .map_err(|e| TrafficError::Io(format!("line {line_no}: bad packet count: {e}")))?;
            if !time.is_finite() || !count.is_finite() || count < 0.0 {
                return Err(TrafficError::Configuration(format!(
                    "line {line_no}: invalid sample ({time}, {count})"
                )));
            }
            points.push((time.rem_euclid(SECONDS_PER_DAY), count));
        }

        if points.is_empty() {
            return Err(TrafficError::Configuration(
                "traffic profile has no samples".to_string(),
            ));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { points })
    }

    /// The interpolated packet count at a time of day in seconds.
    #[must_use]
    pub fn value_at(&self, time_of_day_secs: f64) -> f64 {
        let t = time_of_day_secs.rem_euclid(SECONDS_PER_DAY);
        let (first, last) = (self.points[0], self.points[self.points.len() - 1]);

        // Between the last sample and the first sample of the next day.
        if t < first.0 || t >= last.0 {
            let x0 = last.0;
            let x1 = first.0 + SECONDS_PER_DAY;
            let t = if t < first.0 { t + SECONDS_PER_DAY } else { t };
            return lerp(last, (x1, first.1), x0, t);
        }

        let i = self.points.partition_point(|p| p.0 <= t);
        let (a, b) = (self.points[i - 1], self.points[i]);
        lerp(a, b, a.0, t)
    }

    /// Profile values for the bins covering `[0, horizon)` when tick 0 is
    /// `start_secs` into the day.
    #[must_use]
    pub fn bin_values(&self, start_secs: f64, horizon: Ticks) -> Vec<f64> {
        (0..horizon.div_ceil(BIN_TICKS))
            .map(|bin| self.value_at(start_secs + ticks_to_secs(bin * BIN_TICKS)))
            .collect()
    }

    /// Bin values with uniform noise of 5% of their range, clipped at zero.
    pub fn noisy_bin_values<R: Rng>(&self, start_secs: f64, horizon: Ticks, rng: &mut R) -> Vec<f64> {
        let values = self.bin_values(start_secs, horizon);
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let min = values.iter().copied().fold(f64::MAX, f64::min);
        let noise = (max - min) * NOISE_FRACTION;
        values
            .into_iter()
            .map(|v| {
                let jitter = if noise > 0.0 {
                    rng.gen_range(-noise..noise)
                } else {
                    0.0
                };
                (v + jitter).max(0.0)
            })
            .collect()
    }
}

fn lerp(a: (f64, f64), b: (f64, f64), x0: f64, t: f64) -> f64 {
    let width = b.0 - x0;
    if width <= 0.0 {
        return a.1;
    }
    a.1 + (b.1 - a.1) * (t - x0) / width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_wraps_around_midnight() {
        let profile =
            TrafficProfile::from_csv_str("timestamp,count\n21600,100\n64800,300\n").unwrap();
        assert_eq!(profile.value_at(21600.0), 100.0);
        assert_eq!(profile.value_at(43200.0), 200.0);
        assert_eq!(profile.value_at(64800.0), 300.0);
        // Midnight is halfway between 18:00 and 06:00.
        assert_eq!(profile.value_at(0.0), 200.0);
        assert_eq!(profile.value_at(86400.0 + 43200.0), 200.0);
    }

    #[test]
    fn single_sample_is_constant() {
        let profile = TrafficProfile::from_csv_str("t,c\n100,7\n").unwrap();
        assert_eq!(profile.value_at(5.0), 7.0);
        assert_eq!(profile.bin_values(0.0, 250), vec![7.0, 7.0, 7.0]);
    }

    #[test]
    fn bad_rows_are_rejected() {
        assert!(matches!(
            TrafficProfile::from_csv_str("t,c\n"),
            Err(TrafficError::Configuration(_))
        ));
        assert!(matches!(
            TrafficProfile::from_csv_str("t,c\n1,x\n"),
            Err(TrafficError::Io(msg)) if msg.starts_with("line 2")
        ));
        assert!(matches!(
            TrafficProfile::from_csv_str("t,c\n1,-3\n"),
            Err(TrafficError::Configuration(_))
        ));
    }
}
