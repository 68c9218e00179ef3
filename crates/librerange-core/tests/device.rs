//! Device handle end-to-end tests against the simulated board.

use std::thread;
use std::time::{Duration, Instant};

use librerange_core::device::{Device, DeviceSettings};
use librerange_core::protocol::params::names;
use librerange_core::protocol::ProtocolError;
use librerange_core::sim::{SimHandle, SimulatedBoard};

/// Opens a device against a deterministic simulated board.
fn open_sim() -> (Device, SimHandle) {
    let board = SimulatedBoard::seeded(42);
    let sim = board.handle();
    sim.set_jitter(0);
    let device = Device::open_with_link(Box::new(board)).expect("open against simulator");
    (device, sim)
}

#[test]
fn test_open_syncs_params_and_disables_board_filtering() {
    let (device, sim) = open_sim();

    // The factory board filters with length 5; opening writes n1.
    assert_eq!(sim.params().filter_length, 1);

    let params = device.cached_params();
    assert_eq!(params.get(names::FILTER_LENGTH), Some(1));
    assert_eq!(params.get(names::CHANNEL), Some(26));
    assert_eq!(params.get(names::PAN_ID), Some(0xCAFE));
    assert_eq!(params.get(names::OWN_SHORT_ADDRESS), Some(0));
    assert_eq!(params.get(names::REFLECTOR_SHORT_ADDRESS), Some(2));
}

#[test]
fn test_open_fails_against_a_silent_board() {
    let board = SimulatedBoard::seeded(42);
    board.handle().set_silent(true);
    let err = Device::open_with_link(Box::new(board)).expect_err("silent board cannot open");
    assert!(matches!(err, ProtocolError::Timeout), "got: {err:?}");
}

#[test]
fn test_measure_returns_the_board_result() {
    let (mut device, sim) = open_sim();
    sim.set_distance(1234);
    sim.set_dqf(88);

    let measurement = device.measure(None, Some(2)).expect("measure");
    assert_eq!(measurement.result.distance_cm, 1234);
    assert_eq!(measurement.result.dqf, 88);
    assert_eq!(measurement.result.initiator, 0);
    assert_eq!(measurement.result.reflector, 2);
    assert_eq!(measurement.result.error, None);
    assert!(measurement.antenna_samples.is_empty());
}

#[test]
fn test_measure_routes_remote_initiators() {
    let (mut device, sim) = open_sim();

    // Initiator 7 is not the board's own address, so the board must
    // coordinate a remote ranging between 7 and 2.
    let measurement = device.measure(Some(7), Some(2)).expect("remote measure");
    assert_eq!(measurement.result.initiator, 7);
    assert_eq!(measurement.result.reflector, 2);
    assert_eq!(sim.params().initiator_short_address, 7);
}

#[test]
fn test_measure_with_diversity_results_exposes_samples() {
    let (mut device, _sim) = open_sim();
    device
        .configure(&DeviceSettings {
            antenna_diversity: Some(1),
            provide_all_results: Some(1),
            ..Default::default()
        })
        .expect("configure");

    let measurement = device.measure(None, Some(2)).expect("measure");
    assert_eq!(measurement.antenna_samples.len(), 4);
}

#[test]
fn test_board_error_lands_in_the_result() {
    let (mut device, sim) = open_sim();
    sim.fail_next(7);

    let measurement = device.measure(None, Some(2)).expect("measure");
    assert_eq!(measurement.result.distance_cm, -1);
    assert_eq!(measurement.result.dqf, 0);
    assert_eq!(measurement.result.error, Some(7));

    // The next measurement is clean again.
    let measurement = device.measure(None, Some(2)).expect("measure");
    assert_eq!(measurement.result.error, None);
}

#[test]
fn test_timeout_synthesizes_error_255() {
    let (mut device, sim) = open_sim();
    sim.set_silent(true);

    let started = Instant::now();
    let measurement = device.measure(None, None).expect("timeout is not an error");
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "deadline did not bound the wait"
    );

    assert_eq!(measurement.result.distance_cm, -1);
    assert_eq!(measurement.result.dqf, 0);
    assert_eq!(measurement.result.error, Some(255));
    // Addresses fall back to the configured ones.
    assert_eq!(measurement.result.initiator, 0);
    assert_eq!(measurement.result.reflector, 2);
}

#[test]
fn test_configure_writes_only_differences() {
    let (mut device, sim) = open_sim();

    let before = sim.command_count();
    let params = device
        .configure(&DeviceSettings {
            channel: Some(16),
            ..Default::default()
        })
        .expect("configure");
    assert_eq!(params.get(names::CHANNEL), Some(16));
    // Query, one write, verification query.
    assert_eq!(sim.command_count() - before, 3);

    // A second configure with the same settings only queries.
    let before = sim.command_count();
    device
        .configure(&DeviceSettings {
            channel: Some(16),
            ..Default::default()
        })
        .expect("configure");
    assert_eq!(sim.command_count() - before, 1);
}

#[test]
fn test_rejected_write_shows_up_unchanged() {
    let (mut device, _sim) = open_sim();

    // Channel 9 is outside the board's range; the write is attempted and
    // the verification query reports the unchanged value.
    let params = device
        .configure(&DeviceSettings {
            channel: Some(9),
            ..Default::default()
        })
        .expect("configure");
    assert_eq!(params.get(names::CHANNEL), Some(26));
}

#[test]
fn test_factory_reset_restores_defaults_and_refilters() {
    let (mut device, sim) = open_sim();
    device
        .configure(&DeviceSettings {
            channel: Some(16),
            ..Default::default()
        })
        .expect("configure");
    assert_eq!(sim.params().channel, 16);

    let params = device.factory_reset().expect("factory reset");
    assert_eq!(sim.params().channel, 26);
    // The reset re-enabled board filtering; the handle disabled it again.
    assert_eq!(sim.params().filter_length, 1);
    assert_eq!(params.get(names::FILTER_LENGTH), Some(1));
}

#[test]
fn test_reader_survives_a_malformed_line() {
    let (mut device, sim) = open_sim();

    sim.inject_line("[RESULT] not a number");
    // The reader logs the fault and backs off for two seconds.
    thread::sleep(Duration::from_millis(2300));

    sim.set_distance(555);
    let measurement = device.measure(None, Some(2)).expect("measure after fault");
    assert_eq!(measurement.result.distance_cm, 555);
}

#[test]
fn test_reader_survives_a_garbled_parameter_dump() {
    let (mut device, sim) = open_sim();

    // Byte loss inside a dump can merge two menu lines, leaving the '='
    // ahead of the ':', or cut a line short right after its '='.
    sim.inject_line("[PARAM]");
    sim.inject_line("Channel = 16 (o) : Own");
    sim.inject_line("  c : Channel =");
    // One two-second backoff per garbled line.
    thread::sleep(Duration::from_millis(4500));

    let params = device.sync_params().expect("query after fault");
    assert_eq!(params.get(names::CHANNEL), Some(26));
    assert_eq!(params.get(names::OWN_SHORT_ADDRESS), Some(0));

    sim.set_distance(777);
    let measurement = device.measure(None, Some(2)).expect("measure after fault");
    assert_eq!(measurement.result.distance_cm, 777);
}
