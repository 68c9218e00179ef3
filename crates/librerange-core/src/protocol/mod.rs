//! Serial Protocol Communication
//!
//! Implements the ASCII line protocol spoken by the ranging evaluation
//! firmware: single-character commands towards the board, tagged response
//! lines (`[RESULT]`, `[ERROR]`, `[PARAM]`, ...) back from it.

pub mod commands;
mod decoder;
mod error;
mod line;
pub mod link;
pub mod params;
pub mod serial;

pub use commands::Command;
pub use decoder::{AntennaSample, Decoder, LineOutcome, MeasurementResult, ProtocolEvent};
pub use error::ProtocolError;
pub use line::LineAssembler;
pub use link::{RangingLink, SerialLink};
pub use params::ParameterStore;
pub use serial::{configure_port, list_ports, open_port, PortInfo};

/// Default baud rate of the evaluation boards
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

/// Base timeout for correlated commands in milliseconds.
/// Measurements extend this by a sweep-dependent term, see
/// [`crate::device::measurement_deadline`].
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Error code reported when a correlated command ran into the deadline
pub const TIMEOUT_ERROR_CODE: i64 = 255;
