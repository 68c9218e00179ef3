//! Short-term speed estimation
//!
//! Each cycle contributes one instantaneous speed sample derived from the
//! two most recent window entries versus the two before. Samples live in a
//! small ring and are averaged to keep the displayed value from jittering.

use serde::{Deserialize, Serialize};

/// Coarse movement indication derived from the averaged speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Averaged speed below -1 km/h
    Approaching,
    /// Within the +/-1 km/h dead band
    Steady,
    /// Averaged speed above 1 km/h
    Leaving,
}

impl Direction {
    /// Buckets an averaged speed into a movement direction.
    pub fn from_speed(kmh: i64) -> Self {
        if kmh < -1 {
            Direction::Approaching
        } else if kmh > 1 {
            Direction::Leaving
        } else {
            Direction::Steady
        }
    }

    /// Status-line code: 'A' approaching, 'L' leaving, blank when steady
    pub fn code(&self) -> &'static str {
        match self {
            Direction::Approaching => "A",
            Direction::Leaving => "L",
            Direction::Steady => "",
        }
    }
}

/// Ring of recent speed samples in km/h
#[derive(Debug, Clone)]
pub(crate) struct SpeedEstimator {
    samples: [f64; 4],
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self { samples: [0.0; 4] }
    }

    /// Records one instantaneous speed sample.
    ///
    /// The slot is derived from the window index, so consecutive cycles
    /// rotate through the ring.
    pub fn record(&mut self, slot: usize, kmh: f64) {
        self.samples[slot % self.samples.len()] = kmh;
    }

    /// Averaged speed, rounded to whole km/h.
    pub fn average(&self) -> i64 {
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        mean.round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_over_the_ring() {
        let mut est = SpeedEstimator::new();
        est.record(0, 4.0);
        est.record(1, 4.0);
        est.record(2, 4.0);
        est.record(3, 4.0);
        assert_eq!(est.average(), 4);
    }

    #[test]
    fn test_fresh_estimator_reads_zero() {
        assert_eq!(SpeedEstimator::new().average(), 0);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        let mut est = SpeedEstimator::new();
        est.record(0, 10.0);
        // Mean is 2.5, displayed as 3.
        assert_eq!(est.average(), 3);

        let mut est = SpeedEstimator::new();
        est.record(0, -10.0);
        assert_eq!(est.average(), -3);
    }

    #[test]
    fn test_direction_dead_band() {
        assert_eq!(Direction::from_speed(-2), Direction::Approaching);
        assert_eq!(Direction::from_speed(-1), Direction::Steady);
        assert_eq!(Direction::from_speed(0), Direction::Steady);
        assert_eq!(Direction::from_speed(1), Direction::Steady);
        assert_eq!(Direction::from_speed(2), Direction::Leaving);
    }
}
