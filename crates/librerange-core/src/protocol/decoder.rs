//! Response line decoding
//!
//! Every line the board sends is classified by its leading tag and folded
//! into the session state kept here: measurement results, antenna pair
//! samples and the parameter store. Parameter dumps are stateful, the
//! `[PARAM]` tag switches the decoder into param mode and `[PARAM_END]`
//! leaves it again, so the free-form menu lines in between can be
//! reconstructed into `name = value` entries.
//!
//! The decoder owns no I/O. The reader thread feeds it one line at a time
//! and acts on the returned [`LineOutcome`].

use serde::{Deserialize, Serialize};

use crate::protocol::error::ProtocolError;
use crate::protocol::params::ParameterStore;

/// One measurement outcome as reported by the board.
///
/// Populated by a `[RESULT]` or `[ERROR]` line; only trustworthy once the
/// `[DONE]` completion for the issuing command has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Distance in centimeters, -1 when the transaction failed
    #[serde(rename = "dist")]
    pub distance_cm: i64,
    /// Distance quality factor in percent
    pub dqf: i64,
    /// Initiator address as echoed by the board
    pub initiator: i64,
    /// Reflector address as echoed by the board
    pub reflector: i64,
    /// Device error code, `None` for a clean measurement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<i64>,
}

/// Distance/DQF pair measured on one antenna combination or frequency block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntennaSample {
    /// Distance in centimeters
    #[serde(rename = "dist")]
    pub distance_cm: i64,
    /// Distance quality factor in percent
    pub dqf: i64,
}

/// What one decoded line meant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// `[ERROR]` line; the last field carries the device error code
    Error { fields: Vec<i64> },
    /// `[RESULT]` line with distance, DQF and both addresses
    Result { fields: Vec<i64> },
    /// `[PAIR_NO_k]` antenna diversity sample
    AntennaSample { distance_cm: i64, dqf: i64 },
    /// A line belonging to a parameter dump (including its `[PARAM]` opener)
    ParamLine { raw: String },
    /// `[PARAM_END]` closing a parameter dump
    ParamEnd,
    /// `[DONE]` completion marker
    Done,
}

/// Result of feeding one line into the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOutcome {
    /// The recognized event, `None` for chatter outside any mode
    pub event: Option<ProtocolEvent>,
    /// Whether this line completes the outstanding command
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeMode {
    Idle,
    Param,
    End,
}

/// Session state accumulated from decoded lines.
///
/// Owned by the device handle behind a mutex; the reader thread is the only
/// writer while a command is in flight.
#[derive(Debug)]
pub struct Decoder {
    mode: DecodeMode,
    params: ParameterStore,
    result: Option<MeasurementResult>,
    antenna_samples: Vec<AntennaSample>,
    sample_count: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Fresh decoder with an empty session.
    pub fn new() -> Self {
        Self {
            mode: DecodeMode::Idle,
            params: ParameterStore::new(),
            result: None,
            antenna_samples: Vec::new(),
            sample_count: 0,
        }
    }

    /// Parameter snapshot from the most recent dump(s).
    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    /// The staged measurement result, if any.
    pub fn result(&self) -> Option<MeasurementResult> {
        self.result
    }

    /// Antenna pair samples collected since the last `[RESULT]`.
    pub fn antenna_samples(&self) -> &[AntennaSample] {
        &self.antenna_samples
    }

    /// Number of `[PAIR_NO_*]` lines seen since the last result or error.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Clears the staged result and sample set before a new measurement,
    /// so a completion can never surface data from an earlier run.
    pub fn begin_measurement(&mut self) {
        self.result = None;
        self.antenna_samples.clear();
        self.sample_count = 0;
    }

    /// Classifies one line and updates the session state.
    ///
    /// Tag prefixes are checked first; afterwards the same line runs through
    /// the current mode, which is how a `[PARAM_END]` both emits its event
    /// and fires the completion it just armed. A parse failure leaves the
    /// session untouched and is reported to the caller, the board never
    /// emits a tag it cannot back with well-formed fields.
    pub fn feed_line(&mut self, line: &str) -> Result<LineOutcome, ProtocolError> {
        let mut completed = false;
        let mut event = None;

        if line.starts_with("[ERROR]") {
            let fields = parse_fields(line, 4)?;
            self.sample_count = 0;
            self.result = Some(MeasurementResult {
                distance_cm: fields[0],
                dqf: fields[1],
                initiator: fields[2],
                reflector: fields[3],
                error: fields.last().copied(),
            });
            event = Some(ProtocolEvent::Error { fields });
        } else if line.starts_with("[RESULT]") {
            let fields = parse_fields(line, 4)?;
            self.sample_count = 0;
            self.antenna_samples.clear();
            self.result = Some(MeasurementResult {
                distance_cm: fields[0],
                dqf: fields[1],
                initiator: fields[2],
                reflector: fields[3],
                error: None,
            });
            event = Some(ProtocolEvent::Result { fields });
        } else if line.starts_with("[PAIR_NO_") {
            let fields = parse_fields(line, 2)?;
            self.antenna_samples.push(AntennaSample {
                distance_cm: fields[0],
                dqf: fields[1],
            });
            self.sample_count += 1;
            event = Some(ProtocolEvent::AntennaSample {
                distance_cm: fields[0],
                dqf: fields[1],
            });
        } else if line.starts_with("[PARAM]") {
            self.mode = DecodeMode::Param;
        } else if line.starts_with("[PARAM_END]") {
            self.mode = DecodeMode::End;
            event = Some(ProtocolEvent::ParamEnd);
        } else if line.contains("[DONE]") {
            completed = true;
            event = Some(ProtocolEvent::Done);
        }

        match self.mode {
            DecodeMode::End => {
                completed = true;
                self.mode = DecodeMode::Idle;
            }
            DecodeMode::Param => {
                if let Some((name, value)) = parse_param_line(line)? {
                    self.params.set(name, value);
                }
                if event.is_none() {
                    event = Some(ProtocolEvent::ParamLine {
                        raw: line.to_string(),
                    });
                }
            }
            DecodeMode::Idle => {}
        }

        Ok(LineOutcome { event, completed })
    }
}

/// Parses the whitespace-separated integer fields after a line's tag.
fn parse_fields(line: &str, min: usize) -> Result<Vec<i64>, ProtocolError> {
    let fields = line
        .split_whitespace()
        .skip(1)
        .map(|tok| parse_int(line, tok))
        .collect::<Result<Vec<i64>, ProtocolError>>()?;
    if fields.len() < min {
        return Err(ProtocolError::malformed(
            line,
            format!("expected at least {} fields, got {}", min, fields.len()),
        ));
    }
    Ok(fields)
}

/// Parses one integer token, decimal or `0x` hexadecimal.
///
/// The board prints addresses and error codes in hex (`0x0001`, 64 bit long
/// addresses as sixteen digits) and everything else in decimal, possibly
/// signed (Tx power).
fn parse_int(line: &str, token: &str) -> Result<i64, ProtocolError> {
    let parsed = if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map(|v| v as i64)
    } else {
        token.parse::<i64>()
    };
    parsed.map_err(|_| ProtocolError::malformed(line, format!("invalid integer token '{token}'")))
}

/// Reconstructs a `name = value` entry from one parameter menu line.
///
/// A line qualifies when both `:` and `=` occur past its first byte and are
/// standalone tokens; the name is the concatenation of the words between
/// them (`Own Short Address` -> `OwnShortAddress`). Continuation and legend
/// lines fail the separator check and yield `None`; a qualifying line whose
/// `=` comes before the `:` (two menu lines merged by serial byte loss) is
/// malformed. The filtering method is printed as a phrase and mapped back to
/// its numeric menu code, keeping the firmware's misspelled variance
/// variant.
fn parse_param_line(line: &str) -> Result<Option<(String, i64)>, ProtocolError> {
    match (line.find(':'), line.find('=')) {
        (Some(c), Some(e)) if c > 0 && e > 0 => {}
        _ => return Ok(None),
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let colon = tokens
        .iter()
        .position(|t| *t == ":")
        .ok_or_else(|| ProtocolError::malformed(line, "':' is not a separate token"))?;
    let equals = tokens
        .iter()
        .position(|t| *t == "=")
        .ok_or_else(|| ProtocolError::malformed(line, "'=' is not a separate token"))?;
    let value_token = *tokens
        .get(equals + 1)
        .ok_or_else(|| ProtocolError::malformed(line, "missing value after '='"))?;

    let name = tokens
        .get(colon + 1..equals)
        .ok_or_else(|| ProtocolError::malformed(line, "separators out of order"))?
        .concat();
    let value = match value_token {
        "Average" => 0,
        "Median" => 1,
        "Max." => 4,
        "Min." => match tokens[equals + 1..].concat().as_str() {
            "Min.ofdistanceandDQF" => 2,
            "Min.ofdistanceandDQFconsiderungvariance" => 3,
            _ => 0,
        },
        other => parse_int(line, other)?,
    };
    Ok(Some((name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed(decoder: &mut Decoder, line: &str) -> LineOutcome {
        decoder.feed_line(line).expect("line should decode")
    }

    #[test]
    fn test_result_line_populates_measurement() {
        let mut d = Decoder::new();
        let out = feed(&mut d, "[RESULT] 2965 91 1 2");
        assert_eq!(
            out.event,
            Some(ProtocolEvent::Result {
                fields: vec![2965, 91, 1, 2]
            })
        );
        assert!(!out.completed);
        assert_eq!(
            d.result(),
            Some(MeasurementResult {
                distance_cm: 2965,
                dqf: 91,
                initiator: 1,
                reflector: 2,
                error: None,
            })
        );
    }

    #[test]
    fn test_error_line_carries_last_field_as_code() {
        let mut d = Decoder::new();
        feed(&mut d, "[ERROR] 1 2 3 4 7");
        assert_eq!(
            d.result(),
            Some(MeasurementResult {
                distance_cm: 1,
                dqf: 2,
                initiator: 3,
                reflector: 4,
                error: Some(7),
            })
        );
    }

    #[test]
    fn test_error_line_with_hex_fields() {
        // The firmware prints addresses and the status code in hex.
        let mut d = Decoder::new();
        feed(&mut d, "[ERROR] -1 0 0x1 0x2 0x8F");
        assert_eq!(
            d.result(),
            Some(MeasurementResult {
                distance_cm: -1,
                dqf: 0,
                initiator: 1,
                reflector: 2,
                error: Some(143),
            })
        );
    }

    #[test]
    fn test_pair_lines_accumulate_until_next_result() {
        let mut d = Decoder::new();
        feed(&mut d, "[PAIR_NO_0] 3004 100");
        feed(&mut d, "[PAIR_NO_1] 2989 95");
        assert_eq!(d.sample_count(), 2);
        assert_eq!(
            d.antenna_samples(),
            &[
                AntennaSample {
                    distance_cm: 3004,
                    dqf: 100
                },
                AntennaSample {
                    distance_cm: 2989,
                    dqf: 95
                },
            ]
        );

        // A fresh result starts a new sample set.
        feed(&mut d, "[RESULT] 2995 96 1 2");
        assert_eq!(d.sample_count(), 0);
        assert!(d.antenna_samples().is_empty());
    }

    #[test]
    fn test_error_resets_count_but_keeps_samples() {
        let mut d = Decoder::new();
        feed(&mut d, "[PAIR_NO_0] 3004 100");
        feed(&mut d, "[ERROR] -1 0 1 2 7");
        assert_eq!(d.sample_count(), 0);
        assert_eq!(d.antenna_samples().len(), 1);
    }

    #[test]
    fn test_done_completes_via_substring() {
        let mut d = Decoder::new();
        let out = feed(&mut d, "[DONE]");
        assert_eq!(out.event, Some(ProtocolEvent::Done));
        assert!(out.completed);

        let out = feed(&mut d, "ranging finished [DONE]");
        assert!(out.completed);
    }

    #[test]
    fn test_param_dump_reconstructs_names() {
        let mut d = Decoder::new();
        feed(&mut d, "[PARAM]");
        feed(&mut d, "Communication Parameters:");
        feed(&mut d, "  c : Channel = 22 [11...26]");
        feed(&mut d, "  o : Own Short Address = 0x0001 (1)");
        feed(&mut d, "      Own Long Address = 0x0000000000000001");
        feed(&mut d, "  P : PAN_Id = 0xCAFE (51966)");
        feed(&mut d, "  1 : Frequency Start = 2433 MHz [2403...2481]");
        feed(&mut d, "  t : Tx Power during Ranging = -17 dBm");
        let out = feed(&mut d, "[PARAM_END]");
        assert!(out.completed);

        let p = d.params();
        assert_eq!(p.get("Channel"), Some(22));
        assert_eq!(p.get("OwnShortAddress"), Some(1));
        assert_eq!(p.get("PAN_Id"), Some(51966));
        assert_eq!(p.get("FrequencyStart"), Some(2433));
        assert_eq!(p.get("TxPowerduringRanging"), Some(-17));
        // The long address line has no ':' separator and is not stored.
        assert_eq!(p.get("OwnLongAddress"), None);
        assert_eq!(p.len(), 5);
    }

    #[test]
    fn test_param_end_completes_on_its_own_line() {
        let mut d = Decoder::new();
        feed(&mut d, "[PARAM]");
        let out = feed(&mut d, "[PARAM_END]");
        assert_eq!(out.event, Some(ProtocolEvent::ParamEnd));
        assert!(out.completed);

        // Mode is cleared, further menu-looking lines are ignored.
        let out = feed(&mut d, "  c : Channel = 11");
        assert_eq!(out.event, None);
        assert_eq!(d.params().get("Channel"), None);
    }

    #[test]
    fn test_filter_method_phrases_map_to_codes() {
        let cases = [
            ("Average of distance and DQF", 0),
            ("Median of distance and DQF", 1),
            ("Min. of distance and DQF", 2),
            ("Min. of distance and DQF considerung variance", 3),
            ("Max. of distance and DQF", 4),
            // Unknown Min. phrasing falls back to the default method.
            ("Min. of something else", 0),
        ];
        for (phrase, code) in cases {
            let mut d = Decoder::new();
            feed(&mut d, "[PARAM]");
            feed(
                &mut d,
                &format!("  f : Filtering method for continuous Ranging = {phrase}"),
            );
            assert_eq!(
                d.params().get("FilteringmethodforcontinuousRanging"),
                Some(code),
                "phrase: {phrase}"
            );
        }
    }

    #[test]
    fn test_malformed_result_is_an_error() {
        let mut d = Decoder::new();
        assert!(d.feed_line("[RESULT] 2965 91").is_err());
        assert!(d.feed_line("[RESULT] abc 91 1 2").is_err());
        assert_eq!(d.result(), None);
    }

    #[test]
    fn test_malformed_param_value_is_an_error() {
        let mut d = Decoder::new();
        feed(&mut d, "[PARAM]");
        assert!(d.feed_line("  c : Channel = banana").is_err());
        // The decoder stays in param mode, later lines still decode.
        feed(&mut d, "  c : Channel = 11");
        assert_eq!(d.params().get("Channel"), Some(11));
    }

    #[test]
    fn test_param_line_with_swapped_separators_is_an_error() {
        // Byte loss on the serial line can merge two menu lines, leaving
        // the '=' ahead of the ':'.
        let mut d = Decoder::new();
        feed(&mut d, "[PARAM]");
        assert!(d.feed_line("Channel = 16 (o) : Own").is_err());
        // The decoder stays in param mode, later lines still decode.
        feed(&mut d, "  c : Channel = 11");
        assert_eq!(d.params().get("Channel"), Some(11));
    }

    #[test]
    fn test_param_line_without_a_value_is_an_error() {
        let mut d = Decoder::new();
        feed(&mut d, "[PARAM]");
        assert!(d.feed_line("  c : Channel =").is_err());
        assert_eq!(d.params().get("Channel"), None);
    }

    #[test]
    fn test_chatter_outside_any_mode_is_ignored() {
        let mut d = Decoder::new();
        let out = feed(&mut d, "Ranging Demo Application (1.1.9)");
        assert_eq!(out.event, None);
        assert!(!out.completed);
    }

    #[test]
    fn test_result_serializes_with_wire_names() {
        let result = MeasurementResult {
            distance_cm: 2965,
            dqf: 91,
            initiator: 1,
            reflector: 2,
            error: None,
        };
        let json = serde_json::to_string(&result).expect("serializes");
        assert_eq!(
            json,
            r#"{"dist":2965,"dqf":91,"initiator":1,"reflector":2}"#
        );

        let errored = MeasurementResult {
            error: Some(149),
            ..result
        };
        let json = serde_json::to_string(&errored).expect("serializes");
        assert!(json.ends_with(r#""error":149}"#), "got: {json}");
    }

    #[test]
    fn test_begin_measurement_clears_staged_state() {
        let mut d = Decoder::new();
        feed(&mut d, "[PAIR_NO_0] 3004 100");
        feed(&mut d, "[RESULT] 2995 96 1 2");
        d.begin_measurement();
        assert_eq!(d.result(), None);
        assert_eq!(d.sample_count(), 0);
        assert!(d.antenna_samples().is_empty());
    }
}
