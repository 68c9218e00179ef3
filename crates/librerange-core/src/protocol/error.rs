//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to a ranging board
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Failure reported by the underlying serial port
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The board did not complete the command within its deadline
    #[error("Response timeout")]
    Timeout,

    /// A command was issued while another was awaiting its response
    #[error("Another command is already awaiting its response")]
    CommandInFlight,

    /// A tagged response line that failed to parse
    #[error("Malformed response line '{line}': {reason}")]
    MalformedLine {
        /// The offending line, terminator stripped
        line: String,
        /// What failed to parse
        reason: String,
    },

    /// A completion arrived without a staged result
    #[error("Command completed without a result")]
    MissingResult,

    /// The named serial port does not exist
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Plain I/O failure on the link
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Shorthand for a [`ProtocolError::MalformedLine`].
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        ProtocolError::MalformedLine {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}
