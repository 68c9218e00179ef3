//! Protocol commands
//!
//! Defines the single-character command alphabet of the ranging firmware.
//! Trigger commands (`p`, `m`, `M`) are sent as a bare character; everything
//! else carries a decimal argument and is newline-terminated so the board
//! knows where the number ends.

use serde::{Deserialize, Serialize};

/// Commands understood by the ranging firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Dump the parameter menu ('p')
    QueryParams,

    /// Restore factory defaults ('F')
    FactoryReset,

    /// Range against the configured reflector ('m')
    Measure,

    /// Coordinate a remote ranging between two peer nodes ('M')
    MeasureRemote,

    /// Board-side continuous filtering length ('n')
    SetFilterLength(i64),

    /// Radio channel, 11-26 ('c')
    SetChannel(i64),

    /// Own 16 bit short address ('o')
    SetOwnShortAddress(i64),

    /// Initiator short address for remote ranging ('i')
    SetInitiatorShortAddress(i64),

    /// Initiator long address for remote ranging ('I')
    SetInitiatorLongAddress(i64),

    /// Reflector short address ('r')
    SetReflectorShortAddress(i64),

    /// Reflector long address ('R')
    SetReflectorLongAddress(i64),

    /// PAN identifier ('P')
    SetPanId(i64),

    /// Ranging addressing scheme, 0-3 ('s')
    SetAddressingScheme(i64),

    /// Coordinator addressing mode, 2-3 ('g')
    SetCoordinatorMode(i64),

    /// Filtering method for board-side continuous ranging ('f')
    SetFilterMethod(i64),

    /// Default antenna when diversity is off ('d')
    SetDefaultAntenna(i64),

    /// Antenna diversity on/off ('a')
    SetAntennaDiversity(i64),

    /// Report every antenna pair measurement ('e')
    SetProvideAllResults(i64),

    /// PMU sweep start frequency in MHz ('1')
    SetFrequencyStart(i64),

    /// PMU sweep step code ('2')
    SetFrequencyStep(i64),

    /// PMU sweep stop frequency in MHz ('3')
    SetFrequencyStop(i64),

    /// Minimum threshold during weighted distance calculation ('w')
    SetWeightedMinThreshold(i64),

    /// Tx power during ranging in dBm ('t')
    SetTxPower(i64),

    /// Force the Tx power setting onto peer nodes ('T')
    SetForceTxPower(i64),

    /// Terminal verbosity of the board ('v0'/'v1')
    SetVerbose(bool),
}

impl Command {
    /// The command character on the wire
    pub fn command_char(&self) -> char {
        match self {
            Command::QueryParams => 'p',
            Command::FactoryReset => 'F',
            Command::Measure => 'm',
            Command::MeasureRemote => 'M',
            Command::SetFilterLength(_) => 'n',
            Command::SetChannel(_) => 'c',
            Command::SetOwnShortAddress(_) => 'o',
            Command::SetInitiatorShortAddress(_) => 'i',
            Command::SetInitiatorLongAddress(_) => 'I',
            Command::SetReflectorShortAddress(_) => 'r',
            Command::SetReflectorLongAddress(_) => 'R',
            Command::SetPanId(_) => 'P',
            Command::SetAddressingScheme(_) => 's',
            Command::SetCoordinatorMode(_) => 'g',
            Command::SetFilterMethod(_) => 'f',
            Command::SetDefaultAntenna(_) => 'd',
            Command::SetAntennaDiversity(_) => 'a',
            Command::SetProvideAllResults(_) => 'e',
            Command::SetFrequencyStart(_) => '1',
            Command::SetFrequencyStep(_) => '2',
            Command::SetFrequencyStop(_) => '3',
            Command::SetWeightedMinThreshold(_) => 'w',
            Command::SetTxPower(_) => 't',
            Command::SetForceTxPower(_) => 'T',
            Command::SetVerbose(_) => 'v',
        }
    }

    /// Appends the exact byte sequence the firmware parses for this command.
    ///
    /// Several commands are routinely batched into a single write, so
    /// encoding appends instead of allocating per command.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Command::QueryParams | Command::Measure | Command::MeasureRemote => {
                out.push(self.command_char() as u8);
            }
            Command::FactoryReset => {
                out.extend_from_slice(b"F\n");
            }
            Command::SetVerbose(on) => {
                out.extend_from_slice(if *on { b"v1\n" } else { b"v0\n" });
            }
            Command::SetFilterLength(v)
            | Command::SetChannel(v)
            | Command::SetOwnShortAddress(v)
            | Command::SetInitiatorShortAddress(v)
            | Command::SetInitiatorLongAddress(v)
            | Command::SetReflectorShortAddress(v)
            | Command::SetReflectorLongAddress(v)
            | Command::SetPanId(v)
            | Command::SetAddressingScheme(v)
            | Command::SetCoordinatorMode(v)
            | Command::SetFilterMethod(v)
            | Command::SetDefaultAntenna(v)
            | Command::SetAntennaDiversity(v)
            | Command::SetProvideAllResults(v)
            | Command::SetFrequencyStart(v)
            | Command::SetFrequencyStep(v)
            | Command::SetFrequencyStop(v)
            | Command::SetWeightedMinThreshold(v)
            | Command::SetTxPower(v)
            | Command::SetForceTxPower(v) => {
                out.extend_from_slice(format!("{}{}\n", self.command_char(), v).as_bytes());
            }
        }
    }

    /// Encodes this command alone.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_commands_have_no_terminator() {
        assert_eq!(Command::QueryParams.encode(), b"p");
        assert_eq!(Command::Measure.encode(), b"m");
        assert_eq!(Command::MeasureRemote.encode(), b"M");
    }

    #[test]
    fn test_parameterized_commands_are_newline_terminated() {
        assert_eq!(Command::SetChannel(16).encode(), b"c16\n");
        assert_eq!(Command::SetFilterLength(1).encode(), b"n1\n");
        assert_eq!(Command::SetReflectorShortAddress(2).encode(), b"r2\n");
        assert_eq!(Command::SetFrequencyStart(2403).encode(), b"12403\n");
        assert_eq!(Command::SetTxPower(-17).encode(), b"t-17\n");
        assert_eq!(Command::FactoryReset.encode(), b"F\n");
    }

    #[test]
    fn test_verbose_encodes_as_flag() {
        assert_eq!(Command::SetVerbose(true).encode(), b"v1\n");
        assert_eq!(Command::SetVerbose(false).encode(), b"v0\n");
    }

    #[test]
    fn test_encode_into_batches() {
        let mut buf = Vec::new();
        Command::SetReflectorShortAddress(2).encode_into(&mut buf);
        Command::SetInitiatorShortAddress(3).encode_into(&mut buf);
        Command::MeasureRemote.encode_into(&mut buf);
        assert_eq!(buf, b"r2\ni3\nM");
    }
}
