//! # LibreRange Core Library
//!
//! Host-side driver for AT86RF233-based ranging evaluation boards.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - The serial line protocol spoken by the ranging firmware (commands,
//!   tagged response decoding, parameter menu reconstruction)
//! - A device handle with a background reader, request/response
//!   correlation and parameter reconciliation
//! - Host-side continuous ranging: validity checking, five smoothing
//!   strategies and a short-term speed estimate
//! - A simulated board for tests and demo runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use librerange_core::device::Device;
//!
//! // Open the board, disabling its on-board filtering.
//! let mut device = Device::open("/dev/ttyUSB0", 38_400)?;
//!
//! // One measurement against reflector 2.
//! let measurement = device.measure(None, Some(2))?;
//! println!("{} cm", measurement.result.distance_cm);
//! ```

pub mod device;
pub mod protocol;
pub mod rangefinder;
pub mod sim;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{Device, DeviceSettings, Measurement};
    pub use crate::protocol::{
        list_ports, MeasurementResult, ParameterStore, PortInfo, ProtocolError,
        DEFAULT_BAUD_RATE,
    };
    pub use crate::rangefinder::{
        Direction, FilterMode, FilterPipeline, RangeReading, RangefinderConfig, Validity,
    };
    pub use crate::sim::{SimHandle, SimulatedBoard};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
