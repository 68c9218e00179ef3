//! Device parameter store
//!
//! The `p` command makes the board dump its parameter menu, one
//! `<char> : <name words> = <value>` line per setting. The decoder
//! reconstructs a key by concatenating the name words (`Own Short Address`
//! becomes `OwnShortAddress`) and stores the parsed value here. Symbolic
//! values (the filtering method phrases) arrive already mapped to their
//! numeric codes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Canonical parameter names as reconstructed from the board's menu dump.
pub mod names {
    pub const CHANNEL: &str = "Channel";
    pub const OWN_SHORT_ADDRESS: &str = "OwnShortAddress";
    pub const INITIATOR_SHORT_ADDRESS: &str = "InitiatorShortAddressforRemoteRanging";
    pub const INITIATOR_LONG_ADDRESS: &str = "InitiatorLongAddressforRemoteRanging";
    pub const REFLECTOR_SHORT_ADDRESS: &str = "ReflectorShortAddress";
    pub const REFLECTOR_LONG_ADDRESS: &str = "ReflectorLongAddress";
    pub const PAN_ID: &str = "PAN_Id";
    pub const ADDRESSING_SCHEME: &str = "RangingAddressingScheme";
    pub const COORDINATOR_MODE: &str = "CoordinatorAddressingMode";
    pub const FILTER_METHOD: &str = "FilteringmethodforcontinuousRanging";
    pub const FILTER_LENGTH: &str = "FilteringlengthduringcontinuousRanging";
    pub const DEFAULT_ANTENNA: &str = "DefaultAntenna";
    pub const ANTENNA_DIVERSITY: &str = "AntennaDiversity";
    pub const PROVIDE_ALL_RESULTS: &str = "ProvideallMeasurementResults";
    pub const FREQUENCY_START: &str = "FrequencyStart";
    pub const FREQUENCY_STEP: &str = "FrequencyStep";
    pub const FREQUENCY_STOP: &str = "FrequencyStop";
    pub const VERBOSE: &str = "Verbose";
    pub const TX_POWER: &str = "TxPowerduringRanging";
    pub const FORCE_TX_POWER: &str = "ProvideRangingTxPowerfornextRanging";
    pub const WEIGHTED_MIN_THRESHOLD: &str = "ApplyMinimumThresholdduringweightedDistanceCalc";
}

/// Snapshot of the board's parameter settings.
///
/// Entries accumulate across dumps; a fresh dump overwrites existing keys but
/// never removes stale ones, mirroring how the firmware always prints the
/// full menu.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterStore {
    values: BTreeMap<String, i64>,
}

impl ParameterStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a parameter by its canonical name.
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }

    /// Inserts or overwrites one entry.
    pub fn set(&mut self, name: impl Into<String>, value: i64) {
        self.values.insert(name.into(), value);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no dump has populated the store yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in lexical key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Address the board ranges from when no remote initiator is set.
    pub fn own_short_address(&self) -> Option<i64> {
        self.get(names::OWN_SHORT_ADDRESS)
    }

    /// Address of the configured reflector peer.
    pub fn reflector_short_address(&self) -> Option<i64> {
        self.get(names::REFLECTOR_SHORT_ADDRESS)
    }

    /// Board-side continuous filtering length (host filtering expects 1).
    pub fn filter_length(&self) -> Option<i64> {
        self.get(names::FILTER_LENGTH)
    }

    /// PMU sweep start frequency in MHz.
    pub fn frequency_start(&self) -> Option<i64> {
        self.get(names::FREQUENCY_START)
    }

    /// PMU sweep step code (0-3).
    pub fn frequency_step(&self) -> Option<i64> {
        self.get(names::FREQUENCY_STEP)
    }

    /// PMU sweep stop frequency in MHz.
    pub fn frequency_stop(&self) -> Option<i64> {
        self.get(names::FREQUENCY_STOP)
    }

    /// Board terminal verbosity (0 or 1).
    pub fn verbose(&self) -> Option<i64> {
        self.get(names::VERBOSE)
    }
}
