//! Distance validity checking
//!
//! Raw samples are checked against the previous filtered distance before
//! they enter the window: transaction errors and low-quality samples are
//! replaced by the previous value, implausible jumps are clamped to how far
//! the node could plausibly have moved since the last cycle.

use serde::{Deserialize, Serialize};

/// Samples with a DQF below this are ignored for distance purposes
pub const QUALITY_THRESHOLD: f64 = 10.0;

/// Why a raw distance was substituted or clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    /// Ranging transaction error, previous value kept ('T')
    TransactionError,
    /// DQF below threshold, previous value kept ('D')
    LowQuality,
    /// Distance shrank faster than the speed limit allows ('S')
    TooShort,
    /// Distance grew faster than the speed limit allows ('L')
    TooLong,
}

impl Validity {
    /// Single-character code as shown in the status line
    pub fn code(&self) -> char {
        match self {
            Validity::TransactionError => 'T',
            Validity::LowQuality => 'D',
            Validity::TooShort => 'S',
            Validity::TooLong => 'L',
        }
    }
}

/// Validates one raw sample against the previous filtered distance.
///
/// `limit` is the maximum plausible movement since the last cycle (max
/// speed times elapsed time). A jump beyond it is clamped to the limit
/// rather than dropped, so a genuinely moving node still drags the
/// estimate in its direction. Checked in order: transaction error, low
/// quality, too short, too long.
pub fn validate(raw: f64, dqf: f64, previous: f64, limit: f64) -> (f64, Option<Validity>) {
    if raw == -1.0 {
        (previous, Some(Validity::TransactionError))
    } else if dqf < QUALITY_THRESHOLD {
        (previous, Some(Validity::LowQuality))
    } else if previous - raw > limit {
        (previous - limit, Some(Validity::TooShort))
    } else if raw - previous > limit {
        (previous + limit, Some(Validity::TooLong))
    } else {
        (raw, None)
    }
}
