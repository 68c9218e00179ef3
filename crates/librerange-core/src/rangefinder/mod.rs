//! Continuous ranging with host-side smoothing
//!
//! The board answers one measurement at a time; everything that makes the
//! stream usable happens here. Each cycle the raw distance is validated
//! against the previous estimate, written into a rolling window, and the
//! selected strategy is re-applied over the whole window. A short-term
//! speed estimate with a movement direction falls out of the same state.
//!
//! The pipeline itself is pure (feed it samples and timestamps, get
//! readings back); [`Device::rangefinder`] drives it against a live board.

mod filter;
mod speed;
mod validity;

pub use filter::FilterMode;
pub use speed::Direction;
pub use validity::{validate, Validity, QUALITY_THRESHOLD};

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::device::{Device, DeviceSettings};
use crate::protocol::ProtocolError;
use filter::FilterWindow;
use speed::SpeedEstimator;

/// Fastest movement the validity check considers plausible, in cm/s
pub const MAX_SPEED_CM_S: f64 = 200.0;

/// Smallest usable window
pub const MIN_FILTER_LEN: usize = 2;

/// Pause between ranging cycles
const CYCLE_PAUSE: Duration = Duration::from_millis(100);

/// Configuration for [`Device::rangefinder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangefinderConfig {
    /// Initiator short address
    pub initiator: i64,
    /// Reflector short address
    pub reflector: i64,
    /// Window length, clamped to [`MIN_FILTER_LEN`]
    pub filter_len: usize,
    /// Smoothing strategy
    pub mode: FilterMode,
}

impl Default for RangefinderConfig {
    fn default() -> Self {
        Self {
            initiator: 1,
            reflector: 2,
            filter_len: 5,
            mode: FilterMode::Average,
        }
    }
}

impl RangefinderConfig {
    fn normalized(&self) -> Self {
        let mut cfg = *self;
        if cfg.filter_len < MIN_FILTER_LEN {
            debug!(
                requested = cfg.filter_len,
                clamped = MIN_FILTER_LEN,
                "window too short"
            );
            cfg.filter_len = MIN_FILTER_LEN;
        }
        cfg
    }
}

/// One smoothed reading per ranging cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeReading {
    /// Filtered distance in centimeters
    pub distance_cm: f64,
    /// Filtered quality factor in percent
    pub dqf: f64,
    /// Averaged short-term speed in km/h
    pub speed_kmh: i64,
    /// Movement direction derived from the averaged speed
    pub direction: Direction,
    /// Why the raw sample was substituted or clamped, if it was
    pub validity: Option<Validity>,
    /// Duration of the cycle that produced this reading
    pub cycle: Duration,
}

/// Smoothing state machine fed with one raw sample per cycle
#[derive(Debug, Clone)]
pub struct FilterPipeline {
    mode: FilterMode,
    window: FilterWindow,
    filled: bool,
    last_dist: f64,
    last_dqf: f64,
    times: [Instant; 2],
    time_idx: usize,
    speed: SpeedEstimator,
}

impl FilterPipeline {
    /// Builds the smoothing state for `cfg`.
    pub fn new(cfg: &RangefinderConfig) -> Self {
        let cfg = cfg.normalized();
        let now = Instant::now();
        Self {
            mode: cfg.mode,
            window: FilterWindow::new(cfg.filter_len),
            filled: false,
            last_dist: -1.0,
            last_dqf: -1.0,
            times: [now; 2],
            time_idx: 0,
            speed: SpeedEstimator::new(),
        }
    }

    /// Folds one raw sample into the window and produces a reading.
    ///
    /// `at` is when the sample's measurement started; the gap between
    /// consecutive timestamps bounds how far the distance may have moved
    /// and feeds the speed estimate. The first sample floods the whole
    /// window, so the pipeline is live from the very first cycle.
    pub fn push(&mut self, raw_dist: f64, raw_dqf: f64, at: Instant) -> RangeReading {
        self.times[self.time_idx] = at;
        let mut validity = None;
        let mut elapsed = Duration::ZERO;

        if !self.filled {
            self.window.fill(raw_dist, raw_dqf);
            self.times = [at; 2];
            self.filled = true;
        } else {
            let previous = self.times[(self.time_idx + 1) % self.times.len()];
            elapsed = at.duration_since(previous);
            let limit = MAX_SPEED_CM_S * elapsed.as_secs_f64();

            let (dist, flag) = validate(raw_dist, raw_dqf, self.last_dist, limit);
            validity = flag;
            // The DQF window keeps the raw quality even when the distance
            // was substituted.
            self.window.store(dist, raw_dqf);

            // Short-term averages over the most recent two entries versus
            // the two before, taken before the index advances.
            let recent = (self.window.recent_dist(0) + self.window.recent_dist(1)) / 2.0;
            let older = (self.window.recent_dist(2) + self.window.recent_dist(3)) / 2.0;

            self.window.advance();
            self.time_idx = (self.time_idx + 1) % self.times.len();

            if !elapsed.is_zero() {
                let kmh = (recent - older) / elapsed.as_secs_f64() / 100.0 * 3.6;
                self.speed.record(self.window.index(), kmh);
            }
        }

        let (distance_cm, dqf) = self.window.apply(self.mode);
        self.last_dist = distance_cm;
        self.last_dqf = dqf;

        let speed_kmh = if elapsed.is_zero() {
            0
        } else {
            self.speed.average()
        };

        RangeReading {
            distance_cm,
            dqf,
            speed_kmh,
            direction: Direction::from_speed(speed_kmh),
            validity,
            cycle: elapsed,
        }
    }
}

impl Device {
    /// Continuous ranging: measure, smooth, report, until `stop` is set.
    ///
    /// The board's own continuous filtering and terminal verbosity are
    /// switched off first; the host pipeline does all smoothing. Each
    /// reading is handed to `sink` as it is produced. Cancellation is
    /// checked between cycles only, a measurement in flight finishes
    /// first.
    pub fn rangefinder<F>(
        &mut self,
        cfg: &RangefinderConfig,
        stop: &AtomicBool,
        mut sink: F,
    ) -> Result<(), ProtocolError>
    where
        F: FnMut(RangeReading),
    {
        let cfg = cfg.normalized();
        self.configure(&DeviceSettings {
            verbose: Some(0),
            ..Default::default()
        })?;

        debug!(
            initiator = cfg.initiator,
            reflector = cfg.reflector,
            filter_len = cfg.filter_len,
            mode = %cfg.mode,
            "rangefinder started"
        );

        let mut pipeline = FilterPipeline::new(&cfg);
        while !stop.load(Ordering::Relaxed) {
            let at = Instant::now();
            let measurement = self.measure(Some(cfg.initiator), Some(cfg.reflector))?;
            thread::sleep(CYCLE_PAUSE);
            let reading = pipeline.push(
                measurement.result.distance_cm as f64,
                measurement.result.dqf as f64,
                at,
            );
            sink(reading);
        }
        debug!("rangefinder stopped");
        Ok(())
    }
}
