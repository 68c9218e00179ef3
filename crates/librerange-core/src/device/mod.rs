//! Device handle and correlated operations
//!
//! A [`Device`] owns the serial link to one ranging board plus the reader
//! thread that decodes its asynchronous output. All command/response
//! operations (parameter query, settings write, measurement, factory reset)
//! run through the handle, which serializes them and correlates each with
//! the completion line the reader observes.
//!
//! Opening a handle immediately reconciles the board into the state host
//! tools expect: continuous filtering disabled and the parameter store
//! populated. A board that stays silent fails the open with a timeout
//! instead of handing out a half-initialized handle.

mod correlator;
mod reader;
mod settings;

pub use settings::DeviceSettings;

use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::protocol::{
    serial, AntennaSample, Command, MeasurementResult, ParameterStore, ProtocolError, RangingLink,
    SerialLink, DEFAULT_TIMEOUT_MS, TIMEOUT_ERROR_CODE,
};
use correlator::CallOutcome;
use reader::ReaderShared;

/// Deadline for correlated commands without a sweep-dependent extension
const BASE_DEADLINE: Duration = Duration::from_millis(DEFAULT_TIMEOUT_MS);

/// Completed measurement as returned by [`Device::measure`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// Headline result the board reported (or the synthesized timeout)
    pub result: MeasurementResult,
    /// Individual antenna pair / frequency block results; populated only
    /// when the board reported more than one sample
    pub antenna_samples: Vec<AntennaSample>,
}

/// Handle to one ranging board
pub struct Device {
    link: Box<dyn RangingLink>,
    shared: Arc<ReaderShared>,
    reader: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("shared", &self.shared)
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Opens the board on a serial port.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, ProtocolError> {
        debug!(port = port_name, baud = baud_rate, "opening ranging board");
        let port = serial::open_port(port_name, baud_rate)?;
        Self::open_with_link(Box::new(SerialLink::new(port)))
    }

    /// Opens the board over an already established link (simulator, tests).
    pub fn open_with_link(mut link: Box<dyn RangingLink>) -> Result<Self, ProtocolError> {
        link.clear_input_buffer()?;
        let reader_link = link.try_clone()?;
        let shared = Arc::new(ReaderShared::new());
        let reader = reader::spawn(reader_link, Arc::clone(&shared))?;
        let mut device = Self {
            link,
            shared,
            reader: Some(reader),
        };
        device.configure(&DeviceSettings::default())?;
        Ok(device)
    }

    /// Parameter snapshot from the most recent completed query.
    pub fn cached_params(&self) -> ParameterStore {
        self.shared.decoder().params().clone()
    }

    /// Queries the board's parameter menu and returns the fresh store.
    pub fn sync_params(&mut self) -> Result<ParameterStore, ProtocolError> {
        let outcome = self.shared.correlator.call(
            self.link.as_mut(),
            &Command::QueryParams.encode(),
            BASE_DEADLINE,
        )?;
        match outcome {
            CallOutcome::Completed => Ok(self.cached_params()),
            CallOutcome::TimedOut => Err(ProtocolError::Timeout),
        }
    }

    /// Applies `desired` and returns the authoritative post-write store.
    ///
    /// The board is queried first; only differing values are written, and a
    /// second query afterwards picks up what the board actually accepted.
    /// An out-of-range write is therefore not an error, it simply shows up
    /// as an unchanged value in the returned store.
    pub fn configure(
        &mut self,
        desired: &DeviceSettings,
    ) -> Result<ParameterStore, ProtocolError> {
        let current = self.sync_params()?;
        let cmds = desired.reconcile(&current);
        if cmds.is_empty() {
            return Ok(current);
        }
        debug!(count = cmds.len(), "writing parameter changes");
        let mut batch = Vec::new();
        for cmd in &cmds {
            cmd.encode_into(&mut batch);
        }
        self.link.write_all(&batch)?;
        self.link.flush()?;
        self.sync_params()
    }

    /// Runs one ranging measurement.
    ///
    /// With both addresses given the board either ranges itself (when the
    /// initiator is its own short address) or coordinates a remote ranging
    /// between the two peers. With only a reflector it ranges from its own
    /// address; with neither it reuses its configured reflector. A deadline
    /// overrun is reported as a synthesized result carrying error code 255,
    /// not as an error.
    pub fn measure(
        &mut self,
        initiator: Option<i64>,
        reflector: Option<i64>,
    ) -> Result<Measurement, ProtocolError> {
        let params = self.cached_params();

        let mut cmds = Vec::new();
        match (initiator, reflector) {
            (Some(init), Some(refl)) => {
                cmds.push(Command::SetReflectorShortAddress(refl));
                if Some(init) == params.own_short_address() {
                    cmds.push(Command::Measure);
                } else {
                    cmds.push(Command::SetInitiatorShortAddress(init));
                    cmds.push(Command::MeasureRemote);
                }
            }
            (None, Some(refl)) => {
                cmds.push(Command::SetReflectorShortAddress(refl));
                cmds.push(Command::Measure);
            }
            // An initiator without a reflector cannot be addressed; the
            // board ranges with its stored configuration.
            _ => cmds.push(Command::Measure),
        }

        let deadline = measurement_deadline(&params);
        let mut batch = Vec::new();
        for cmd in &cmds {
            cmd.encode_into(&mut batch);
        }

        self.shared.decoder().begin_measurement();
        debug!(?deadline, "starting measurement");
        let outcome = self
            .shared
            .correlator
            .call(self.link.as_mut(), &batch, deadline)?;

        match outcome {
            CallOutcome::Completed => {
                let decoder = self.shared.decoder();
                let result = decoder.result().ok_or(ProtocolError::MissingResult)?;
                if let Some(code) = result.error {
                    warn!(code, "board reported ranging error");
                }
                let antenna_samples = if decoder.sample_count() > 1 {
                    decoder.antenna_samples().to_vec()
                } else {
                    Vec::new()
                };
                Ok(Measurement {
                    result,
                    antenna_samples,
                })
            }
            CallOutcome::TimedOut => {
                warn!("measurement timed out");
                let result = MeasurementResult {
                    distance_cm: -1,
                    dqf: 0,
                    initiator: initiator.or(params.own_short_address()).unwrap_or(-1),
                    reflector: reflector.or(params.reflector_short_address()).unwrap_or(-1),
                    error: Some(TIMEOUT_ERROR_CODE),
                };
                Ok(Measurement {
                    result,
                    antenna_samples: Vec::new(),
                })
            }
        }
    }

    /// Restores the board's factory defaults.
    ///
    /// The reset command itself is fire-and-forget; the handle then
    /// re-disables continuous filtering and returns the fresh store.
    pub fn factory_reset(&mut self) -> Result<ParameterStore, ProtocolError> {
        debug!("restoring factory defaults");
        self.link.write_all(&Command::FactoryReset.encode())?;
        self.link.flush()?;
        self.configure(&DeviceSettings::default())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// Deadline for one measurement, derived from the board's sweep settings.
///
/// With board verbosity on, every sweep point produces extra terminal
/// output that has to drain over the serial line before the completion
/// arrives, so the wait grows with the sweep width. Verbosity off keeps the
/// plain base deadline. Step codes 2 and 3 double and quadruple the sweep
/// stride; missing parameters contribute no extension.
pub fn measurement_deadline(params: &ParameterStore) -> Duration {
    let stride = match params.frequency_step() {
        Some(2) => 2,
        Some(3) => 4,
        _ => 1,
    };
    let start = params.frequency_start().unwrap_or(0);
    let stop = params.frequency_stop().unwrap_or(0);
    let verbose = params.verbose().unwrap_or(0);
    let points = (stop - start).div_euclid(stride) + 1;
    let extension = 0.16 * points as f64 * verbose as f64;
    BASE_DEADLINE + Duration::from_secs_f64(extension.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::params::names;

    fn sweep_params(start: i64, step: i64, stop: i64, verbose: i64) -> ParameterStore {
        let mut p = ParameterStore::new();
        p.set(names::FREQUENCY_START, start);
        p.set(names::FREQUENCY_STEP, step);
        p.set(names::FREQUENCY_STOP, stop);
        p.set(names::VERBOSE, verbose);
        p
    }

    #[test]
    fn test_deadline_is_base_when_quiet() {
        let params = sweep_params(2403, 0, 2481, 0);
        assert_eq!(measurement_deadline(&params), BASE_DEADLINE);
    }

    #[test]
    fn test_deadline_scales_with_sweep_points() {
        // 78 MHz sweep at stride 1 is 79 points.
        let params = sweep_params(2403, 0, 2481, 1);
        let expected = BASE_DEADLINE + Duration::from_secs_f64(0.16 * 79.0);
        assert_eq!(measurement_deadline(&params), expected);
    }

    #[test]
    fn test_step_codes_shrink_the_point_count() {
        // Step code 2 doubles the stride: (78 / 2) + 1 = 40 points.
        let params = sweep_params(2403, 2, 2481, 1);
        let expected = BASE_DEADLINE + Duration::from_secs_f64(0.16 * 40.0);
        assert_eq!(measurement_deadline(&params), expected);

        // Step code 3 quadruples it: floor(78 / 4) + 1 = 20 points.
        let params = sweep_params(2403, 3, 2481, 1);
        let expected = BASE_DEADLINE + Duration::from_secs_f64(0.16 * 20.0);
        assert_eq!(measurement_deadline(&params), expected);
    }

    #[test]
    fn test_missing_sweep_params_mean_no_extension() {
        let params = ParameterStore::new();
        assert_eq!(measurement_deadline(&params), BASE_DEADLINE);
    }
}
