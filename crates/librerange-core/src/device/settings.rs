//! Desired device settings and reconciliation
//!
//! Settings are written by diffing against the board's current parameter
//! store and emitting one set command per differing value, so an already
//! configured board sees no writes at all. Host-side continuous filtering
//! relies on the board's own filtering being disabled, which is why the
//! `n1` command is forced ahead of everything whenever the store disagrees.

use serde::{Deserialize, Serialize};

use crate::protocol::params::names;
use crate::protocol::{Command, ParameterStore};

/// Desired board settings; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub channel: Option<i64>,
    pub own_short_address: Option<i64>,
    pub initiator_short_address: Option<i64>,
    pub initiator_long_address: Option<i64>,
    pub reflector_short_address: Option<i64>,
    pub reflector_long_address: Option<i64>,
    pub pan_id: Option<i64>,
    pub addressing_scheme: Option<i64>,
    pub coordinator_mode: Option<i64>,
    pub filter_method: Option<i64>,
    pub default_antenna: Option<i64>,
    pub antenna_diversity: Option<i64>,
    pub provide_all_results: Option<i64>,
    pub frequency_start: Option<i64>,
    pub frequency_step: Option<i64>,
    pub frequency_stop: Option<i64>,
    pub weighted_min_threshold: Option<i64>,
    pub tx_power: Option<i64>,
    pub force_tx_power: Option<i64>,
    pub verbose: Option<i64>,
}

impl DeviceSettings {
    /// Commands needed to move a board at `current` to these settings.
    ///
    /// Emission order is fixed: the filtering-length disable first, then the
    /// communication, ranging and misc parameters in menu order, verbosity
    /// last. Any verbosity value other than 1 writes `v0`.
    pub fn reconcile(&self, current: &ParameterStore) -> Vec<Command> {
        let mut cmds = Vec::new();

        if current.filter_length() != Some(1) {
            cmds.push(Command::SetFilterLength(1));
        }

        let entries: [(&str, Option<i64>, fn(i64) -> Command); 19] = [
            (names::CHANNEL, self.channel, Command::SetChannel),
            (
                names::OWN_SHORT_ADDRESS,
                self.own_short_address,
                Command::SetOwnShortAddress,
            ),
            (
                names::INITIATOR_SHORT_ADDRESS,
                self.initiator_short_address,
                Command::SetInitiatorShortAddress,
            ),
            (
                names::INITIATOR_LONG_ADDRESS,
                self.initiator_long_address,
                Command::SetInitiatorLongAddress,
            ),
            (
                names::REFLECTOR_SHORT_ADDRESS,
                self.reflector_short_address,
                Command::SetReflectorShortAddress,
            ),
            (
                names::REFLECTOR_LONG_ADDRESS,
                self.reflector_long_address,
                Command::SetReflectorLongAddress,
            ),
            (names::PAN_ID, self.pan_id, Command::SetPanId),
            (
                names::ADDRESSING_SCHEME,
                self.addressing_scheme,
                Command::SetAddressingScheme,
            ),
            (
                names::COORDINATOR_MODE,
                self.coordinator_mode,
                Command::SetCoordinatorMode,
            ),
            (names::FILTER_METHOD, self.filter_method, Command::SetFilterMethod),
            (
                names::DEFAULT_ANTENNA,
                self.default_antenna,
                Command::SetDefaultAntenna,
            ),
            (
                names::ANTENNA_DIVERSITY,
                self.antenna_diversity,
                Command::SetAntennaDiversity,
            ),
            (
                names::PROVIDE_ALL_RESULTS,
                self.provide_all_results,
                Command::SetProvideAllResults,
            ),
            (
                names::FREQUENCY_START,
                self.frequency_start,
                Command::SetFrequencyStart,
            ),
            (
                names::FREQUENCY_STEP,
                self.frequency_step,
                Command::SetFrequencyStep,
            ),
            (
                names::FREQUENCY_STOP,
                self.frequency_stop,
                Command::SetFrequencyStop,
            ),
            (
                names::WEIGHTED_MIN_THRESHOLD,
                self.weighted_min_threshold,
                Command::SetWeightedMinThreshold,
            ),
            (names::TX_POWER, self.tx_power, Command::SetTxPower),
            (
                names::FORCE_TX_POWER,
                self.force_tx_power,
                Command::SetForceTxPower,
            ),
        ];

        for (name, desired, make) in entries {
            if let Some(value) = desired {
                if current.get(name) != Some(value) {
                    cmds.push(make(value));
                }
            }
        }

        if let Some(verbose) = self.verbose {
            if current.verbose() != Some(verbose) {
                cmds.push(Command::SetVerbose(verbose == 1));
            }
        }

        cmds
    }
}
