//! Simulated ranging board
//!
//! In-process stand-in for the evaluation board firmware. It speaks the
//! board's side of the serial protocol: single-character commands in,
//! tagged line sequences out, with the parameter menu, result and error
//! formats matching the firmware's terminal output. Backs the CLI's demo
//! mode and the integration tests, no hardware or pseudo terminal needed.
//!
//! Board-side continuous ranging, verbose sweep dumps and the interactive
//! prompt chatter are not reproduced; the driver disables the first two on
//! open and ignores the third.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::protocol::RangingLink;

/// Poll interval while a read waits for board output
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default read timeout, same brief blocking read the serial layer uses
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

/// IEEE address printed on the menu's `Own Long Address` line
const OWN_LONG_ADDRESS: u64 = 0x0004_25FF_FF17_5C5B;

/// Board parameters as the firmware stores them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimParams {
    pub channel: i64,
    pub own_short_address: i64,
    pub initiator_short_address: i64,
    pub initiator_long_address: i64,
    pub reflector_short_address: i64,
    pub reflector_long_address: i64,
    pub pan_id: i64,
    pub addressing_scheme: i64,
    pub coordinator_mode: i64,
    pub filter_length: i64,
    pub filter_method: i64,
    pub default_antenna: i64,
    pub antenna_diversity: i64,
    pub provide_all_results: i64,
    pub weighted_min_threshold: i64,
    pub frequency_start: i64,
    pub frequency_step: i64,
    pub frequency_stop: i64,
    pub verbose: i64,
    pub tx_power: i64,
    pub force_tx_power: i64,
}

impl SimParams {
    /// Factory defaults as burned into the evaluation firmware. Note the
    /// filtering length of 5: a factory-fresh board filters on its own
    /// until the host writes `n1`.
    fn factory() -> Self {
        Self {
            channel: 26,
            own_short_address: 0x0000,
            initiator_short_address: 0x0001,
            initiator_long_address: 0x0004_25FF_FF17_5C7D,
            reflector_short_address: 0x0002,
            reflector_long_address: 0x0004_25FF_FF17_5C9D,
            pan_id: 0xCAFE,
            addressing_scheme: 0,
            coordinator_mode: 2,
            filter_length: 5,
            filter_method: 0,
            default_antenna: 0,
            antenna_diversity: 1,
            provide_all_results: 0,
            weighted_min_threshold: 1,
            frequency_start: 2403,
            frequency_step: 2,
            frequency_stop: 2443,
            verbose: 0,
            tx_power: -17,
            force_tx_power: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputState {
    /// Waiting for a command character
    Command,
    /// A setter is collecting its argument up to the newline
    Argument(char),
}

struct SimState {
    params: SimParams,
    input: InputState,
    arg: String,
    output: VecDeque<u8>,
    rng: StdRng,
    distance_cm: i64,
    dqf: i64,
    jitter: i64,
    fail_codes: VecDeque<i64>,
    silent: bool,
    commands: u64,
}

impl SimState {
    fn push_byte(&mut self, byte: u8) {
        match self.input {
            InputState::Argument(cmd) => {
                if byte == b'\n' || byte == b'\r' {
                    let value = self.arg.parse::<i64>().unwrap_or(0);
                    self.apply_setter(cmd, value);
                    self.arg.clear();
                    self.input = InputState::Command;
                } else {
                    self.arg.push(byte as char);
                }
            }
            InputState::Command => self.dispatch(byte),
        }
    }

    fn dispatch(&mut self, byte: u8) {
        match byte {
            b'p' => {
                self.commands += 1;
                self.print_param_menu();
            }
            b'm' => {
                self.commands += 1;
                self.run_measurement(false);
            }
            b'M' => {
                self.commands += 1;
                self.run_measurement(true);
            }
            b'F' => {
                self.commands += 1;
                self.emit_line("Reload factory parameters");
                self.params = SimParams::factory();
            }
            b'n' | b'f' | b'c' | b'o' | b'i' | b'I' | b'r' | b'R' | b'P' | b's' | b'g'
            | b'd' | b'a' | b'e' | b'w' | b'1' | b'2' | b'3' | b'v' | b't' | b'T' => {
                self.commands += 1;
                self.input = InputState::Argument(byte as char);
            }
            _ => {}
        }
    }

    /// Applies one argument command with the firmware's validation: most
    /// out-of-range values are ignored, a bad filtering length becomes 1.
    fn apply_setter(&mut self, cmd: char, value: i64) {
        let p = &mut self.params;
        match cmd {
            'c' if (11..=26).contains(&value) => p.channel = value,
            'o' => p.own_short_address = value & 0xFFFF,
            'i' => p.initiator_short_address = value & 0xFFFF,
            'I' => p.initiator_long_address = value,
            'r' => p.reflector_short_address = value & 0xFFFF,
            'R' => p.reflector_long_address = value,
            'P' => p.pan_id = value & 0xFFFF,
            's' if (0..=3).contains(&value) => p.addressing_scheme = value,
            'g' if (2..=3).contains(&value) => p.coordinator_mode = value,
            'n' => p.filter_length = if (1..=16).contains(&value) { value } else { 1 },
            'f' if (0..=4).contains(&value) => p.filter_method = value,
            'd' if (0..=1).contains(&value) => p.default_antenna = value,
            'a' if (0..=1).contains(&value) => p.antenna_diversity = value,
            'e' if (0..=1).contains(&value) => p.provide_all_results = value,
            'w' if (0..=1).contains(&value) => p.weighted_min_threshold = value,
            '1' if (2324..=2527).contains(&value) => p.frequency_start = value,
            '2' if (0..=3).contains(&value) => p.frequency_step = value,
            '3' if (2324..=2527).contains(&value) => p.frequency_stop = value,
            'v' if (0..=1).contains(&value) => p.verbose = value,
            't' => p.tx_power = value.clamp(-17, 4),
            'T' if (0..=1).contains(&value) => p.force_tx_power = value,
            _ => {}
        }
    }

    /// Queues one terminal line with its trailing newline.
    fn emit_line(&mut self, line: &str) {
        if !self.silent {
            self.output.extend(line.bytes());
            self.output.push_back(b'\n');
        }
    }

    fn print_param_menu(&mut self) {
        let p = self.params;
        self.emit_line("");
        self.emit_line("[PARAM]");
        self.emit_line("Communication Parameters:");
        self.emit_line(&format!("  c : Channel = {} [11...26]", p.channel));
        self.emit_line(&format!(
            "  o : Own Short Address = 0x{0:04X} ({0})",
            p.own_short_address
        ));
        self.emit_line(&format!(
            "      Own Long Address = 0x{:016X}",
            OWN_LONG_ADDRESS
        ));
        self.emit_line(&format!(
            "  i : Initiator Short Address for Remote Ranging = 0x{0:04X} ({0})",
            p.initiator_short_address
        ));
        self.emit_line(&format!(
            "  I : Initiator Long Address for Remote Ranging = 0x{:016X}",
            p.initiator_long_address
        ));
        self.emit_line(&format!(
            "  r : Reflector Short Address = 0x{0:04X} ({0})",
            p.reflector_short_address
        ));
        self.emit_line(&format!(
            "  R : Reflector Long Address = 0x{:016X}",
            p.reflector_long_address
        ));
        self.emit_line(&format!("  P : PAN_Id = 0x{0:04X} ({0})", p.pan_id));
        self.emit_line(&format!(
            "  s : Ranging Addressing Scheme = {} [0,1,2,3]",
            p.addressing_scheme
        ));
        self.emit_line("      (0 - Initiator short address, Reflector short address)");
        self.emit_line("      (1 - Initiator short address, Reflector long address)");
        self.emit_line("      (2 - Initiator long address, Reflector short address)");
        self.emit_line("      (3 - Initiator long address, Reflector long address)");
        self.emit_line(&format!(
            "  g : Coordinator Addressing Mode = {} [2,3]",
            p.coordinator_mode
        ));
        self.emit_line("      (2 - Short address)");
        self.emit_line("      (3 - Long address)");
        self.emit_line("");
        self.emit_line("Ranging Parameters:");
        self.emit_line(&format!(
            "  n : Filtering length during continuous Ranging = {} [1...16]",
            p.filter_length
        ));
        self.emit_line(&format!(
            "  f : Filtering method for continuous Ranging = {}",
            filter_method_phrase(p.filter_method)
        ));
        self.emit_line(&format!(
            "  d : Default Antenna = {} [0,1] (AD disabled only)",
            p.default_antenna
        ));
        self.emit_line(&format!(
            "  a : Antenna Diversity = {} [0,1]",
            p.antenna_diversity
        ));
        self.emit_line(&format!(
            "  e : Provide all Measurement Results = {} [0,1]",
            p.provide_all_results
        ));
        self.emit_line(&format!(
            "  w : Apply Minimum Threshold during weighted Distance Calc = {} [0,1]",
            p.weighted_min_threshold
        ));
        self.emit_line("      Ranging Method = 1 -> PMU based on AT86RF233");
        self.emit_line(&format!(
            "  1 : Frequency Start = {} MHz [2324...2527]",
            p.frequency_start
        ));
        self.emit_line(&format!(
            "  2 : Frequency Step = {} -> {:.1} MHz [0,1,2,3]",
            p.frequency_step,
            (1_i64 << p.frequency_step) as f64 * 0.5
        ));
        self.emit_line(&format!(
            "  3 : Frequency Stop = {} MHz [2324...2527]",
            p.frequency_stop
        ));
        self.emit_line("      Distance Offset = 0 cm");
        self.emit_line("");
        self.emit_line("Misc. Parameters:");
        self.emit_line(&format!("  v : Verbose = {} [0...1]", p.verbose));
        self.emit_line("");
        self.emit_line("Radio Parameters:");
        self.emit_line(&format!(
            "  t : Tx Power during Ranging = {} dBm",
            p.tx_power
        ));
        self.emit_line(&format!(
            "  T : Provide Ranging Tx Power for next Ranging = {} [0,1]",
            p.force_tx_power
        ));
        self.emit_line("[PARAM_END]");
        self.emit_line("");
    }

    fn run_measurement(&mut self, remote: bool) {
        // The input loop acknowledges the keystroke before results arrive.
        self.emit_line("");

        let initiator = if remote {
            self.params.initiator_short_address
        } else {
            self.params.own_short_address
        };
        let reflector = self.params.reflector_short_address;

        if let Some(code) = self.fail_codes.pop_front() {
            // Double space as printed by the firmware's address helper.
            self.emit_line(&format!(
                "[ERROR] -1 0  0x{initiator:X} 0x{reflector:X} 0x{code:X}"
            ));
            self.emit_line("[DONE]");
            self.emit_line(&format!("ERROR: 0x{code:X}"));
            return;
        }

        let dist = self.sample(self.distance_cm);
        let dqf = self.sample(self.dqf).clamp(0, 100);
        let pairs =
            if self.params.antenna_diversity == 1 && self.params.provide_all_results == 1 {
                4
            } else {
                0
            };

        self.emit_line(&format!(
            "[RESULT] {dist} {dqf}  0x{initiator:X} 0x{reflector:X}"
        ));
        for i in 0..pairs {
            let pair_dist = self.sample(self.distance_cm);
            let pair_dqf = self.sample(self.dqf).clamp(0, 100);
            self.emit_line(&format!("[PAIR_NO_{i}] {pair_dist} {pair_dqf}"));
        }
        self.emit_line("[DONE]");

        // Human oriented trailer, ignored by the decoder.
        self.emit_line("RTB_SUCCESS");
        if pairs == 0 {
            self.emit_line(&format!("Distance = {dist} cm"));
            self.emit_line(&format!("DQF = {dqf} %"));
        } else {
            self.emit_line(&format!("Weighted Distance = {dist} cm"));
            self.emit_line(&format!("Weighted DQF = {dqf} %"));
        }
        self.emit_line("");
    }

    fn sample(&mut self, base: i64) -> i64 {
        if self.jitter == 0 {
            base
        } else {
            base + self.rng.gen_range(-self.jitter..=self.jitter)
        }
    }
}

/// Firmware's menu phrasing, stray parenthesis and misspelling included.
fn filter_method_phrase(method: i64) -> &'static str {
    match method {
        0 => "Average of distance and DQF",
        1 => "Median of distance and DQF",
        2 => "Min. of distance and DQF",
        3 => "Min. of distance and DQF considerung variance",
        4 => "Max. of distance and DQF)",
        _ => "Undefined Filtering method",
    }
}

/// Board end of the simulated serial link.
///
/// Implements [`RangingLink`], so `Device::open_with_link` accepts it in
/// place of a serial port. Clones share the board state, mirroring the two
/// halves of a cloned port.
pub struct SimulatedBoard {
    state: Arc<Mutex<SimState>>,
    timeout: Duration,
}

impl SimulatedBoard {
    /// Board with factory defaults and entropy-seeded jitter.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic board for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                params: SimParams::factory(),
                input: InputState::Command,
                arg: String::new(),
                output: VecDeque::new(),
                rng,
                distance_cm: 2965,
                dqf: 95,
                jitter: 2,
                fail_codes: VecDeque::new(),
                silent: false,
                commands: 0,
            })),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Control handle for scripting the board.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for SimulatedBoard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + self.timeout;
        loop {
            {
                let mut state = self.lock();
                if !state.output.is_empty() {
                    let n = buf.len().min(state.output.len());
                    for slot in buf.iter_mut().take(n) {
                        if let Some(byte) = state.output.pop_front() {
                            *slot = byte;
                        }
                    }
                    return Ok(n);
                }
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no board output"));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Write for SimulatedBoard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        for &byte in buf {
            state.push_byte(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RangingLink for SimulatedBoard {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.lock().output.clear();
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn RangingLink>> {
        Ok(Box::new(Self {
            state: Arc::clone(&self.state),
            timeout: self.timeout,
        }))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.lock().output.len() as u32)
    }
}

/// Scripting handle onto a [`SimulatedBoard`]
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current parameter snapshot.
    pub fn params(&self) -> SimParams {
        self.lock().params
    }

    /// Number of commands the board has dispatched so far.
    pub fn command_count(&self) -> u64 {
        self.lock().commands
    }

    /// Base distance reported by subsequent measurements.
    pub fn set_distance(&self, cm: i64) {
        self.lock().distance_cm = cm;
    }

    /// Base DQF reported by subsequent measurements.
    pub fn set_dqf(&self, dqf: i64) {
        self.lock().dqf = dqf;
    }

    /// Spread applied around distance and DQF; zero makes results exact.
    pub fn set_jitter(&self, cm: i64) {
        self.lock().jitter = cm;
    }

    /// Queues one measurement failure with the given status code.
    pub fn fail_next(&self, code: i64) {
        self.lock().fail_codes.push_back(code);
    }

    /// Silences or revives the board; commands are still consumed.
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Queues one raw line of board output, bypassing the command loop.
    pub fn inject_line(&self, line: &str) {
        self.lock().emit_line(line);
    }
}
