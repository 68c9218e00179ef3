//! Continuous ranging tests against the simulated board.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use librerange_core::device::{Device, DeviceSettings};
use librerange_core::rangefinder::{Direction, RangefinderConfig, Validity};
use librerange_core::sim::{SimHandle, SimulatedBoard};

fn open_sim() -> (Device, SimHandle) {
    let board = SimulatedBoard::seeded(7);
    let sim = board.handle();
    sim.set_jitter(0);
    let device = Device::open_with_link(Box::new(board)).expect("open against simulator");
    (device, sim)
}

/// The board ranges from its own address, no remote coordination.
fn local_cfg() -> RangefinderConfig {
    RangefinderConfig {
        initiator: 0,
        reflector: 2,
        ..Default::default()
    }
}

#[test]
fn test_rangefinder_streams_smoothed_readings() {
    let (mut device, sim) = open_sim();
    sim.set_distance(300);
    sim.set_dqf(90);

    let stop = AtomicBool::new(false);
    let mut readings = Vec::new();
    device
        .rangefinder(&local_cfg(), &stop, |r| {
            readings.push(r);
            if readings.len() >= 5 {
                stop.store(true, Ordering::Relaxed);
            }
        })
        .expect("rangefinder run");

    assert_eq!(readings.len(), 5);
    for r in &readings {
        assert_eq!(r.distance_cm, 300.0);
        assert_eq!(r.dqf, 90.0);
        assert_eq!(r.direction, Direction::Steady);
        assert_eq!(r.validity, None);
    }
    assert_eq!(readings[0].cycle, Duration::ZERO);
    // Later cycles include at least the inter-cycle pause.
    assert!(readings[1].cycle >= Duration::from_millis(100));
}

#[test]
fn test_rangefinder_rides_through_a_board_error() {
    let (mut device, sim) = open_sim();
    sim.set_distance(300);
    sim.set_dqf(90);

    let stop = AtomicBool::new(false);
    let mut readings = Vec::new();
    device
        .rangefinder(&local_cfg(), &stop, |r| {
            readings.push(r);
            if readings.len() == 2 {
                sim.fail_next(0x95);
            }
            if readings.len() >= 4 {
                stop.store(true, Ordering::Relaxed);
            }
        })
        .expect("rangefinder run");

    // The failed cycle kept the previous estimate; only the DQF window
    // took the zero-quality hit.
    let failed = &readings[2];
    assert_eq!(failed.validity, Some(Validity::TransactionError));
    assert_eq!(failed.distance_cm, 300.0);
    assert_eq!(failed.dqf, (90.0 * 4.0) / 5.0);

    assert_eq!(readings[3].validity, None);
    assert_eq!(readings[3].distance_cm, 300.0);
}

#[test]
fn test_rangefinder_switches_board_verbosity_off() {
    let (mut device, sim) = open_sim();
    device
        .configure(&DeviceSettings {
            verbose: Some(1),
            ..Default::default()
        })
        .expect("configure");
    assert_eq!(sim.params().verbose, 1);

    let stop = AtomicBool::new(false);
    device
        .rangefinder(&local_cfg(), &stop, |_| {
            stop.store(true, Ordering::Relaxed);
        })
        .expect("rangefinder run");
    assert_eq!(sim.params().verbose, 0);
}
