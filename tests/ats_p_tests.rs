use cabsignal::cab::{BeaconData, DoorState, Handles, Key, TickInput, VehicleKinematics, RED_ASPECT};
use cabsignal::devices::{ats_p, AtsPConfig, DeviceKind, DeviceState};
use cabsignal::output::indicator;
use cabsignal::pattern::{SpeedLimit, TargetPosition};
use cabsignal::sim::{Simulation, VehicleModel};
use cabsignal::{InitializationMode, Train, TrainConfig};

fn p_config() -> TrainConfig {
    TrainConfig {
        ats_p: Some(AtsPConfig::default()),
        ..TrainConfig::default()
    }
}

fn p_train() -> Train {
    let mut train = Train::new(&p_config());
    train.initialize(InitializationMode::OnService);
    train
}

fn input(location: f64, speed: f64) -> TickInput {
    TickInput {
        elapsed: 0.1,
        vehicle: VehicleKinematics {
            location,
            speed,
            acceleration: 0.0,
        },
        handles: Handles {
            reverser: 1,
            ..Handles::default()
        },
        doors: DoorState::Closed,
        preceding_distance: None,
    }
}

fn p_state(train: &Train) -> ats_p::State {
    train.ats_p().map(|p| p.state()).unwrap()
}

#[test]
fn test_red_signal_scenario() {
    let config = p_config();
    let mut train = Train::new(&config);
    train.initialize(InitializationMode::OnService);
    let vehicle = VehicleModel::new(config.specs).at(0.0, 25.0);
    let mut sim = Simulation::new(train, vehicle, 0.1);

    sim.train
        .set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 600.0));
    assert_eq!(p_state(&sim.train), ats_p::State::Normal);

    // 25 m/s is above the warning curve at 600 m but below the brake curve
    sim.step();
    assert_eq!(p_state(&sim.train), ats_p::State::Pattern);

    let mut brake_location = None;
    let mut previous: Option<u32> = None;
    while sim.vehicle.location < 600.0 && sim.time() < 200.0 {
        let location = sim.vehicle.location;
        let output = sim.step();
        if p_state(&sim.train) == ats_p::State::Brake {
            assert!(output.handles.brake >= 1);
            assert_eq!(output.indicators[indicator::P_BRAKE], 1);
            // Never lowered while the brake stays applied
            if let Some(previous) = previous {
                assert!(
                    output.handles.brake >= previous,
                    "notch fell from {} to {} at {:.1} m",
                    previous,
                    output.handles.brake,
                    location
                );
            }
            previous = Some(output.handles.brake);
            if brake_location.is_none() {
                brake_location = Some(location);
                assert_eq!(
                    sim.train.journal().path_of(DeviceKind::AtsP),
                    vec![
                        DeviceState::AtsP(ats_p::State::Standby),
                        DeviceState::AtsP(ats_p::State::Normal),
                        DeviceState::AtsP(ats_p::State::Pattern),
                        DeviceState::AtsP(ats_p::State::Brake),
                    ]
                );
            }
        } else {
            previous = None;
        }
    }

    // The brake curve meets 25 m/s about 473 m before the signal
    let brake_location = brake_location.unwrap();
    assert!(brake_location > 100.0 && brake_location < 150.0, "braked at {}", brake_location);
    assert!(sim.vehicle.location >= 600.0);
    assert!(sim.vehicle.speed < 8.0, "passed the signal at {} m/s", sim.vehicle.speed);

    // Past the signal the brake is full until the train stands
    while sim.vehicle.speed > 0.0 && sim.time() < 200.0 {
        let output = sim.step();
        assert_eq!(p_state(&sim.train), ats_p::State::Brake);
        assert_eq!(output.handles.brake, sim.train.specs().brake_notches);
    }
    assert_eq!(sim.vehicle.speed, 0.0);
    assert!(sim.vehicle.location < 620.0, "stopped at {}", sim.vehicle.location);
    let output = sim.step();
    assert_eq!(output.handles.brake, 0);
    assert_ne!(p_state(&sim.train), ats_p::State::Brake);
}

#[test]
fn test_full_brake_past_target() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 600.0));

    let output = train.elapse(&input(610.0, 10.0));
    let p = train.ats_p().unwrap();
    assert_eq!(p.state(), ats_p::State::Brake);
    assert_eq!(p.governing_pattern(), Some(ats_p::PatternKind::Signal(0)));
    assert_eq!(p.brake_notch(), train.specs().brake_notches);
    assert_eq!(output.handles.brake, train.specs().brake_notches);
}

#[test]
fn test_brake_notch_at_least_one() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 600.0));

    // Just above the brake curve far from the signal needs little braking
    let output = train.elapse(&input(0.0, 28.5));
    assert_eq!(p_state(&train), ats_p::State::Brake);
    assert!(output.handles.brake >= 1);
    assert!(output.handles.brake < train.specs().brake_notches);
}

#[test]
fn test_doors_open_demand_full_brake() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 600.0));
    let mut open = input(0.0, 28.5);
    open.doors = DoorState::Open;
    let output = train.elapse(&open);
    assert_eq!(output.handles.brake, train.specs().brake_notches);
}

#[test]
fn test_signal_patterns_deduplicated() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 600.0));
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 603.0));
    assert_eq!(train.ats_p().unwrap().signal_patterns().len(), 1);

    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL_ACTIVE, 0, RED_ASPECT, 900.0));
    assert_eq!(train.ats_p().unwrap().signal_patterns().len(), 2);

    // A clear aspect for a known signal removes its pattern
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, 3, 601.0));
    let patterns = train.ats_p().unwrap().signal_patterns();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].target(), TargetPosition::At(900.0));
}

#[test]
fn test_renewal_active_does_not_engage() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL_ACTIVE, 0, RED_ASPECT, 600.0));
    assert_eq!(p_state(&train), ats_p::State::Standby);
    assert!(train.ats_p().unwrap().signal_patterns().is_empty());
}

#[test]
fn test_passed_signal_dropped_when_slow() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 100.0));
    train.elapse(&input(0.0, 3.0));
    assert_eq!(train.ats_p().unwrap().signal_patterns().len(), 1);

    train.elapse(&input(140.0, 3.0));
    assert_eq!(train.ats_p().unwrap().signal_patterns().len(), 1);

    train.elapse(&input(151.0, 3.0));
    assert!(train.ats_p().unwrap().signal_patterns().is_empty());
    assert_eq!(p_state(&train), ats_p::State::Normal);
}

#[test]
fn test_immediate_stop_service_and_emergency() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_IMMEDIATE_STOP, 0, RED_ASPECT, 80.0));
    assert_eq!(p_state(&train), ats_p::State::Service);
    let output = train.elapse(&input(0.0, 10.0));
    assert_eq!(output.handles.brake, train.specs().brake_notches);

    train.key_down(Key::B1);
    assert_eq!(p_state(&train), ats_p::State::Service);
    train.elapse(&input(30.0, 0.0));
    train.key_down(Key::B1);
    assert_eq!(p_state(&train), ats_p::State::Normal);

    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_IMMEDIATE_STOP, 0, RED_ASPECT, 0.0));
    assert_eq!(p_state(&train), ats_p::State::Emergency);
    let output = train.elapse(&input(0.0, 10.0));
    assert_eq!(output.handles.brake, train.specs().emergency_notch());
}

#[test]
fn test_speed_limit_beacons() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_CURVE, 300_060, 0, 0.0));
    assert_eq!(p_state(&train), ats_p::State::Normal);

    let curve = *train.ats_p().unwrap().pattern(ats_p::PatternKind::Curve).unwrap();
    assert_eq!(curve.target(), TargetPosition::At(300.0));
    assert_eq!(curve.target_speed(), SpeedLimit::Limit(60.0 / 3.6));

    // Past the start the limit holds wherever the train is
    train.elapse(&input(320.0, 10.0));
    let curve = *train.ats_p().unwrap().pattern(ats_p::PatternKind::Curve).unwrap();
    assert_eq!(curve.target(), TargetPosition::Immediate);
    train.elapse(&input(330.0, 17.5));
    assert_eq!(p_state(&train), ats_p::State::Brake);
    assert_eq!(
        train.ats_p().unwrap().governing_pattern(),
        Some(ats_p::PatternKind::Curve)
    );

    // Zero payload clears it
    train.set_beacon(&BeaconData::new(ats_p::BEACON_CURVE, 0, 0, 0.0));
    let curve = *train.ats_p().unwrap().pattern(ats_p::PatternKind::Curve).unwrap();
    assert!(!curve.is_active());

    train.set_beacon(&BeaconData::new(ats_p::BEACON_ROUTE_PERMANENT, 90, 0, 0.0));
    let route = *train
        .ats_p()
        .unwrap()
        .pattern(ats_p::PatternKind::RoutePermanent)
        .unwrap();
    assert_eq!(route.target(), TargetPosition::Immediate);
    assert_eq!(route.target_speed(), SpeedLimit::Limit(90.0 / 3.6));
}

#[test]
fn test_compatibility_limits() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_COMPATIBILITY, 300_045, 0, 0.0));
    train.elapse(&input(0.0, 10.0));

    let p = train.ats_p().unwrap();
    let upcoming = p.pattern(ats_p::PatternKind::CompatibilityTemporary).unwrap();
    assert_eq!(upcoming.target(), TargetPosition::At(300.0));
    assert!(!p.pattern(ats_p::PatternKind::CompatibilityPermanent).unwrap().is_active());

    train.elapse(&input(310.0, 10.0));
    let p = train.ats_p().unwrap();
    assert!(!p.pattern(ats_p::PatternKind::CompatibilityTemporary).unwrap().is_active());
    let current = p.pattern(ats_p::PatternKind::CompatibilityPermanent).unwrap();
    assert_eq!(current.target(), TargetPosition::Immediate);
    assert!((p.brake_speed() - 45.0 / 3.6).abs() < 1e-9);

    train.elapse(&input(320.0, 13.0));
    assert_eq!(p_state(&train), ats_p::State::Brake);
}

#[test]
fn test_released_mode() {
    let mut train = p_train();
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 600.0));
    train.key_down(Key::B2);
    assert_eq!(p_state(&train), ats_p::State::Released);

    // No supervision and no blocking while released
    let output = train.elapse(&input(610.0, 20.0));
    assert_eq!(output.handles.brake, 0);
    assert_eq!(output.indicators[indicator::P_RELEASE], 1);
    assert!(!train.chain()[0].blocking);

    train.key_down(Key::B2);
    assert_eq!(p_state(&train), ats_p::State::Standby);
    assert!(train.ats_p().unwrap().signal_patterns().is_empty());
}

#[test]
fn test_train_limit_survives_standby() {
    let config = TrainConfig {
        ats_p: Some(AtsPConfig {
            maximum_speed: Some(100.0 / 3.6),
            ..AtsPConfig::default()
        }),
        ..TrainConfig::default()
    };
    let mut train = Train::new(&config);
    train.initialize(InitializationMode::OnService);
    train.set_beacon(&BeaconData::new(ats_p::BEACON_ROUTE_PERMANENT, 120, 0, 0.0));

    train.elapse(&input(0.0, 26.0));
    assert_eq!(p_state(&train), ats_p::State::Normal);
    train.elapse(&input(10.0, 28.0));
    assert_eq!(p_state(&train), ats_p::State::Brake);
    assert_eq!(
        train.ats_p().unwrap().governing_pattern(),
        Some(ats_p::PatternKind::TrainPermanent)
    );

    train.key_down(Key::B2);
    train.key_down(Key::B2);
    assert_eq!(p_state(&train), ats_p::State::Standby);
    let p = train.ats_p().unwrap();
    assert!(!p.pattern(ats_p::PatternKind::RoutePermanent).unwrap().is_active());
    let limit = p.pattern(ats_p::PatternKind::TrainPermanent).unwrap();
    assert!(limit.is_persistent());
    assert_eq!(limit.target_speed(), SpeedLimit::Limit(100.0 / 3.6));
}

#[test]
fn test_train_limit_override() {
    let mut p = ats_p::AtsP::new(AtsPConfig::default());
    assert!(!p.pattern(ats_p::PatternKind::TrainPermanent).unwrap().is_active());

    p.set_train_limit(SpeedLimit::Limit(70.0 / 3.6));
    let limit = p.pattern(ats_p::PatternKind::TrainPermanent).unwrap();
    assert!(limit.is_persistent());
    assert_eq!(limit.target(), TargetPosition::Immediate);
    assert_eq!(limit.target_speed(), SpeedLimit::Limit(70.0 / 3.6));
}

#[test]
fn test_power_up_sequence() {
    let mut train = Train::new(&p_config());
    train.initialize(InitializationMode::OnEmergency);
    assert_eq!(p_state(&train), ats_p::State::Suppressed);

    let mut braked = input(0.0, 0.0);
    braked.handles.brake = 9;
    train.elapse(&braked);
    assert_eq!(p_state(&train), ats_p::State::Initializing);
    for _ in 0..35 {
        train.elapse(&braked);
    }
    assert_eq!(p_state(&train), ats_p::State::Standby);

    train.key_down(Key::D);
    assert_eq!(p_state(&train), ats_p::State::Disabled);
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, RED_ASPECT, 600.0));
    assert_eq!(p_state(&train), ats_p::State::Disabled);
}
