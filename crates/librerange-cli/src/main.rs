//! Command-line front end for ranging evaluation boards.
//!
//! Talks to one board over a serial port (or to the in-process simulated
//! board with `--demo`) and exposes the library's operations as
//! subcommands: parameter dump and configuration, single measurements,
//! batch distance surveys and the continuous rangefinder display.

use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use librerange_core::device::{Device, DeviceSettings, Measurement};
use librerange_core::protocol::{
    list_ports, ParameterStore, DEFAULT_BAUD_RATE, TIMEOUT_ERROR_CODE,
};
use librerange_core::rangefinder::{FilterMode, RangefinderConfig};
use librerange_core::sim::SimulatedBoard;

#[derive(Parser)]
#[command(author, version, about = "Host tool for 2.4 GHz radio ranging evaluation boards")]
struct Args {
    /// Serial port of the board (e.g. /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,
    /// Baud rate of the serial link
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Talk to an in-process simulated board instead of hardware
    #[arg(long, default_value_t = false)]
    demo: bool,
    /// Raise log verbosity (repeat for debug and trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List available serial ports
    Ports,
    /// Query the board's parameters
    Params {
        /// Print the parameter store as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write board settings and show what the board accepted
    Configure(ConfigureArgs),
    /// Run ranging measurements
    Measure {
        /// Initiator short address; the board itself when omitted
        #[arg(long, value_parser = parse_int)]
        initiator: Option<i64>,
        /// Reflector short address; the board's configured one when omitted
        #[arg(long, value_parser = parse_int)]
        reflector: Option<i64>,
        /// Number of measurements
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Print each measurement as a JSON line
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Batch distance survey between a tag and a set of anchors
    Survey {
        /// Tag (reflector) short address
        #[arg(long, default_value_t = 2, value_parser = parse_int)]
        tag: i64,
        /// Anchor (initiator) short addresses, comma separated
        #[arg(long, value_delimiter = ',', value_parser = parse_int, default_value = "1")]
        anchors: Vec<i64>,
        /// Number of survey cycles
        #[arg(long, default_value_t = 2)]
        count: u32,
        /// Log file, appended to
        #[arg(long, default_value = "atmel_distance.log")]
        logfile: PathBuf,
        /// 0 logs the weighted result only, 1 adds the individual antenna results
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
        style: u8,
    },
    /// Continuous ranging with host-side smoothing (Ctrl-C stops)
    Rangefinder {
        /// Initiator short address
        #[arg(long, default_value_t = 1, value_parser = parse_int)]
        initiator: i64,
        /// Reflector short address
        #[arg(long, default_value_t = 2, value_parser = parse_int)]
        reflector: i64,
        /// Smoothing window length (at least 2)
        #[arg(long, default_value_t = 5)]
        filter_len: usize,
        /// Smoothing strategy: av, me, mi, ma or mv
        #[arg(long, default_value = "av")]
        mode: FilterMode,
    },
    /// Restore the board's factory defaults
    Reset,
}

/// Board settings for the `configure` subcommand; omitted flags are left
/// untouched. Values accept decimal or `0x` hexadecimal.
#[derive(clap::Args)]
struct ConfigureArgs {
    #[arg(long, value_parser = parse_int)]
    channel: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    own_short_address: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    initiator_short_address: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    initiator_long_address: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    reflector_short_address: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    reflector_long_address: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    pan_id: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    addressing_scheme: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    coordinator_mode: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    filter_method: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    default_antenna: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    antenna_diversity: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    provide_all_results: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    frequency_start: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    frequency_step: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    frequency_stop: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    weighted_min_threshold: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    tx_power: Option<i64>,
    #[arg(long, value_parser = parse_int)]
    force_tx_power: Option<i64>,
    /// Board-side terminal verbosity (not the host log level)
    #[arg(long, value_parser = parse_int)]
    device_verbose: Option<i64>,
}

impl ConfigureArgs {
    fn settings(&self) -> DeviceSettings {
        DeviceSettings {
            channel: self.channel,
            own_short_address: self.own_short_address,
            initiator_short_address: self.initiator_short_address,
            initiator_long_address: self.initiator_long_address,
            reflector_short_address: self.reflector_short_address,
            reflector_long_address: self.reflector_long_address,
            pan_id: self.pan_id,
            addressing_scheme: self.addressing_scheme,
            coordinator_mode: self.coordinator_mode,
            filter_method: self.filter_method,
            default_antenna: self.default_antenna,
            antenna_diversity: self.antenna_diversity,
            provide_all_results: self.provide_all_results,
            frequency_start: self.frequency_start,
            frequency_step: self.frequency_step,
            frequency_stop: self.frequency_stop,
            weighted_min_threshold: self.weighted_min_threshold,
            tx_power: self.tx_power,
            force_tx_power: self.force_tx_power,
            verbose: self.device_verbose,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Cmd::Ports = args.command {
        let ports = list_ports();
        if ports.is_empty() {
            println!("no serial ports found");
        }
        for port in ports {
            match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => println!(
                    "{}  {:04x}:{:04x}  {}",
                    port.name,
                    vid,
                    pid,
                    port.product.as_deref().unwrap_or("-")
                ),
                _ => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let mut device = open_device(&args)?;
    match args.command {
        // Handled before the device was opened.
        Cmd::Ports => {}
        Cmd::Params { json } => {
            let params = device.sync_params().context("querying parameters")?;
            print_params(&params, json)?;
        }
        Cmd::Configure(cfg) => {
            let params = device
                .configure(&cfg.settings())
                .context("writing settings")?;
            print_params(&params, false)?;
        }
        Cmd::Measure {
            initiator,
            reflector,
            count,
            json,
        } => cmd_measure(&mut device, initiator, reflector, count, json)?,
        Cmd::Survey {
            tag,
            anchors,
            count,
            logfile,
            style,
        } => cmd_survey(&mut device, tag, &anchors, count, &logfile, style)?,
        Cmd::Rangefinder {
            initiator,
            reflector,
            filter_len,
            mode,
        } => cmd_rangefinder(
            &mut device,
            RangefinderConfig {
                initiator,
                reflector,
                filter_len,
                mode,
            },
        )?,
        Cmd::Reset => {
            let params = device.factory_reset().context("factory reset")?;
            print_params(&params, false)?;
        }
    }
    Ok(())
}

/// Maps `-v` repeats onto an `EnvFilter` default; `RUST_LOG` wins when set.
fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_device(args: &Args) -> anyhow::Result<Device> {
    if args.demo {
        debug!("using the simulated board");
        let device = Device::open_with_link(Box::new(SimulatedBoard::new()))
            .context("opening simulated board")?;
        return Ok(device);
    }
    let port = args
        .port
        .as_deref()
        .context("no serial port given (use --port or --demo)")?;
    Device::open(port, args.baud).with_context(|| format!("opening ranging board on {port}"))
}

/// Parses a flag value as decimal or `0x` hexadecimal, like the board
/// prints its addresses.
fn parse_int(s: &str) -> Result<i64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map(|v| v as i64)
            .map_err(|e| e.to_string())
    } else {
        s.parse::<i64>().map_err(|e| e.to_string())
    }
}

fn print_params(params: &ParameterStore, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(params)?);
    } else {
        for (name, value) in params.iter() {
            println!("{name} = {value}");
        }
    }
    Ok(())
}

fn cmd_measure(
    device: &mut Device,
    initiator: Option<i64>,
    reflector: Option<i64>,
    count: u32,
    json: bool,
) -> anyhow::Result<()> {
    for _ in 0..count {
        let measurement = device
            .measure(initiator, reflector)
            .context("measurement failed")?;
        if json {
            println!("{}", serde_json::to_string(&measurement)?);
            continue;
        }
        let r = &measurement.result;
        match r.error {
            Some(code) => println!("{} -> {}: error 0x{code:X}", r.initiator, r.reflector),
            None => println!(
                "{} -> {}: {} cm (DQF {} %)",
                r.initiator, r.reflector, r.distance_cm, r.dqf
            ),
        }
        for (i, sample) in measurement.antenna_samples.iter().enumerate() {
            println!("  pair {i}: {} cm (DQF {} %)", sample.distance_cm, sample.dqf);
        }
    }
    Ok(())
}

fn cmd_survey(
    device: &mut Device,
    tag: i64,
    anchors: &[i64],
    count: u32,
    logfile: &Path,
    style: u8,
) -> anyhow::Result<()> {
    device
        .configure(&DeviceSettings {
            verbose: Some(0),
            provide_all_results: Some(if style == 0 { 0 } else { 1 }),
            ..Default::default()
        })
        .context("preparing board for survey")?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logfile)
        .with_context(|| format!("opening log file {}", logfile.display()))?;
    writeln!(
        file,
        "# survey {} tag={} anchors={:?} cycles={}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        tag,
        anchors,
        count
    )?;

    for cycle in 0..count {
        let mut entries = Vec::new();
        for (slot, &anchor) in anchors.iter().enumerate() {
            let measurement = device
                .measure(Some(anchor), Some(tag))
                .context("survey measurement")?;
            entries.extend(survey_entries(&measurement, anchor, tag, style, slot == 0));
        }
        let line = survey_line(cycle, &entries);
        println!("{line}");
        writeln!(file, "{line}")?;
    }

    println!("closed logfile: {}", logfile.display());
    Ok(())
}

/// One survey log line: `|  n| ` plus the joined per-anchor entries.
fn survey_line(cycle: u32, entries: &[String]) -> String {
    format!("|{cycle:3}| {}", entries.join(" "))
}

/// Log entries for one anchor's measurement.
///
/// A timeout logs the marker plus a `-1` placeholder row. A device error
/// logs the error code in the distance column with DQF `-1` and zeroes any
/// antenna results. Style 1 brackets each result off from its antenna
/// results with `#`.
fn survey_entries(
    measurement: &Measurement,
    anchor: i64,
    tag: i64,
    style: u8,
    first: bool,
) -> Vec<String> {
    let r = &measurement.result;
    if r.error == Some(TIMEOUT_ERROR_CODE) {
        let mut entries = vec!["Timeout: ( 255 )".to_string()];
        if style == 0 {
            entries.push(format!("{anchor} {tag} -1"));
        } else {
            entries.push(format!("{anchor} {tag} -1 0"));
        }
        return entries;
    }

    let (dist, dqf, fail) = match r.error {
        Some(code) => (code, -1, 0),
        None => (r.distance_cm, r.dqf, 1),
    };
    let res_str = format!("{} {} {} {}", r.initiator, r.reflector, dist, dqf);
    if style == 0 {
        return vec![res_str];
    }

    let mut entries = vec![if first {
        format!("{res_str} #")
    } else {
        format!("# {res_str} #")
    }];
    for sample in &measurement.antenna_samples {
        entries.push(format!(
            "{} {}",
            sample.distance_cm * fail,
            sample.dqf * fail
        ));
    }
    entries
}

fn cmd_rangefinder(device: &mut Device, cfg: RangefinderConfig) -> anyhow::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    let ctrlc_stop = Arc::clone(&stop);
    thread::spawn(move || {
        if runtime.block_on(signal::ctrl_c()).is_ok() {
            ctrlc_stop.store(true, Ordering::Relaxed);
        }
    });

    println!("Result:");
    println!("{}", "-".repeat(63));
    let outcome = device.rangefinder(&cfg, &stop, |r| {
        let err = r.validity.map(|v| v.code().to_string()).unwrap_or_default();
        let line = format!(
            "Dist: {:5}cm| Spd: {:2}| Dir: {:1}| DQF: {:3}%| Dur: {:3}ms| Err: {:1}| ",
            r.distance_cm as i64,
            r.speed_kmh,
            r.direction.code(),
            r.dqf as i64,
            r.cycle.as_millis(),
            err,
        );
        print!("\r{line}");
        let _ = io::stdout().flush();
    });
    println!();
    outcome.context("rangefinder failed")?;
    Ok(())
}
