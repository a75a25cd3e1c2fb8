use cabsignal::cab::{BeaconData, Handles, Key, TickInput, VehicleKinematics, DoorState};
use cabsignal::devices::{ats_p, ats_sx, AtsPConfig, AtsSxConfig};
use cabsignal::output::{indicator, Sound, SoundCommand, SoundEvent};
use cabsignal::{InitializationMode, TickOutput, Train, TrainConfig};

fn sx_train(mode: InitializationMode) -> Train {
    let config = TrainConfig {
        ats_sx: Some(AtsSxConfig::default()),
        ..TrainConfig::default()
    };
    let mut train = Train::new(&config);
    train.initialize(mode);
    train
}

fn input(location: f64, speed: f64, brake: u32) -> TickInput {
    TickInput {
        elapsed: 0.1,
        vehicle: VehicleKinematics {
            location,
            speed,
            acceleration: 0.0,
        },
        handles: Handles {
            reverser: 1,
            brake,
            ..Handles::default()
        },
        doors: DoorState::Closed,
        preceding_distance: None,
    }
}

fn has_event(output: &TickOutput, sound: Sound, command: SoundCommand) -> bool {
    output.sounds.iter().any(|event| *event == SoundEvent { sound, command })
}

fn sx_state(train: &Train) -> ats_sx::State {
    train.ats_sx().map(|sx| sx.state()).unwrap()
}

#[test]
fn test_alarm_acknowledge_and_reset() {
    let mut train = sx_train(InitializationMode::OnService);
    train.elapse(&input(0.0, 20.0, 0));
    assert_eq!(sx_state(&train), ats_sx::State::Normal);

    train.set_beacon(&BeaconData::new(ats_sx::BEACON_S_LONG, 0, 1, 600.0));
    assert_eq!(sx_state(&train), ats_sx::State::Alarm);

    let output = train.elapse(&input(2.0, 20.0, 0));
    assert_eq!(output.indicators[indicator::SX_ALARM], 1);
    assert!(has_event(&output, Sound::AtsBell, SoundCommand::StartLoop));

    // Acknowledgement needs the brake applied
    train.key_down(Key::S);
    assert_eq!(sx_state(&train), ats_sx::State::Alarm);
    train.elapse(&input(4.0, 20.0, 1));
    train.key_down(Key::S);
    assert_eq!(sx_state(&train), ats_sx::State::Chime);

    let output = train.elapse(&input(6.0, 20.0, 1));
    assert!(has_event(&output, Sound::AtsBell, SoundCommand::StopLoop));
    assert!(has_event(&output, Sound::AtsChime, SoundCommand::StartLoop));
    assert_eq!(output.indicators[indicator::SX_ALARM], 0);

    // Still short of the signal and fast: no reset
    train.key_down(Key::A1);
    assert_eq!(sx_state(&train), ats_sx::State::Chime);

    train.elapse(&input(601.0, 20.0, 0));
    train.key_down(Key::A1);
    assert_eq!(sx_state(&train), ats_sx::State::Normal);
}

#[test]
fn test_reset_allowed_below_reset_speed() {
    let mut train = sx_train(InitializationMode::OnService);
    train.elapse(&input(0.0, 20.0, 1));
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_S_LONG, 0, 0, 400.0));
    train.key_down(Key::S);
    assert_eq!(sx_state(&train), ats_sx::State::Chime);

    train.elapse(&input(100.0, 1.0, 1));
    train.key_down(Key::A1);
    assert_eq!(sx_state(&train), ats_sx::State::Normal);
}

#[test]
fn test_clear_aspect_raises_no_alarm() {
    let mut train = sx_train(InitializationMode::OnService);
    train.elapse(&input(0.0, 20.0, 0));
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_S_LONG, 0, 5, 600.0));
    assert_eq!(sx_state(&train), ats_sx::State::Normal);
}

#[test]
fn test_unacknowledged_alarm_brakes_to_stop() {
    let mut train = sx_train(InitializationMode::OnService);
    train.elapse(&input(0.0, 20.0, 0));
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_S_LONG, 0, 0, 600.0));

    let mut output = train.elapse(&input(0.0, 20.0, 0));
    for _ in 0..60 {
        output = train.elapse(&input(0.0, 20.0, 0));
    }
    assert_eq!(sx_state(&train), ats_sx::State::Emergency);
    assert_eq!(output.handles.brake, train.specs().emergency_notch());
    assert_eq!(output.indicators[indicator::SX_EMERGENCY], 1);

    // Reset only at standstill
    train.key_down(Key::B1);
    assert_eq!(sx_state(&train), ats_sx::State::Emergency);
    train.elapse(&input(50.0, 0.0, 9));
    train.key_down(Key::B1);
    assert_eq!(sx_state(&train), ats_sx::State::Chime);
}

#[test]
fn test_immediate_stop_beacon() {
    let mut train = sx_train(InitializationMode::OnService);
    train.elapse(&input(0.0, 10.0, 0));

    train.set_beacon(&BeaconData::new(ats_sx::BEACON_IMMEDIATE_STOP, 0, 3, 0.0));
    assert_eq!(sx_state(&train), ats_sx::State::Normal);

    train.set_beacon(&BeaconData::new(ats_sx::BEACON_IMMEDIATE_STOP, 0, 0, 0.0));
    assert_eq!(sx_state(&train), ats_sx::State::Emergency);
    let output = train.elapse(&input(1.0, 10.0, 0));
    assert_eq!(output.handles.brake, 9);
}

#[test]
fn test_accidental_departure_only_when_moving() {
    let mut train = sx_train(InitializationMode::OnService);
    train.elapse(&input(0.0, 0.0, 0));
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_ACCIDENTAL_DEPARTURE, 0, 0, 0.0));
    assert_eq!(sx_state(&train), ats_sx::State::Normal);

    train.elapse(&input(0.5, 3.0, 0));
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_ACCIDENTAL_DEPARTURE, 0, 0, 0.0));
    assert_eq!(sx_state(&train), ats_sx::State::Emergency);
}

#[test]
fn test_speed_check_window() {
    let mut train = sx_train(InitializationMode::OnService);
    train.elapse(&input(0.0, 30.0, 0));

    // Second beacon inside the window: overspeed
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_SPEED_CHECK_ARM, 0, 10, 0.0));
    assert!(train.ats_sx().unwrap().is_speed_check_armed());
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_SPEED_CHECK, 0, 10, 0.0));
    assert_eq!(sx_state(&train), ats_sx::State::Alarm);

    // Second beacon after the window closed: nothing
    let mut train = sx_train(InitializationMode::OnService);
    train.elapse(&input(0.0, 10.0, 0));
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_SPEED_CHECK_ARM, 0, 10, 0.0));
    for i in 0..10 {
        train.elapse(&input(f64::from(i), 10.0, 0));
    }
    assert!(!train.ats_sx().unwrap().is_speed_check_armed());
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_SPEED_CHECK, 0, 10, 0.0));
    assert_eq!(sx_state(&train), ats_sx::State::Normal);
}

#[test]
fn test_power_up_waits_for_emergency_brake() {
    let mut train = sx_train(InitializationMode::OnEmergency);
    let output = train.elapse(&input(0.0, 0.0, 0));
    assert_eq!(sx_state(&train), ats_sx::State::Suppressed);
    assert_eq!(output.indicators[indicator::SX_POWER], 0);

    let output = train.elapse(&input(0.0, 0.0, 9));
    assert_eq!(sx_state(&train), ats_sx::State::Initializing);
    assert_eq!(output.indicators[indicator::SX_POWER], 1);

    for _ in 0..35 {
        train.elapse(&input(0.0, 0.0, 9));
    }
    assert_eq!(sx_state(&train), ats_sx::State::Chime);
    train.key_down(Key::A1);
    assert_eq!(sx_state(&train), ats_sx::State::Normal);
}

#[test]
fn test_power_switch() {
    let mut train = sx_train(InitializationMode::OnService);
    train.key_down(Key::D);
    assert_eq!(sx_state(&train), ats_sx::State::Disabled);

    train.elapse(&input(0.0, 20.0, 0));
    train.set_beacon(&BeaconData::new(ats_sx::BEACON_S_LONG, 0, 0, 300.0));
    assert_eq!(sx_state(&train), ats_sx::State::Disabled);

    train.key_down(Key::D);
    assert_eq!(sx_state(&train), ats_sx::State::Suppressed);
}

#[test]
fn test_quiet_while_ats_p_supervises() {
    let config = TrainConfig {
        ats_sx: Some(AtsSxConfig::default()),
        ats_p: Some(AtsPConfig::default()),
        ..TrainConfig::default()
    };
    let mut train = Train::new(&config);
    train.initialize(InitializationMode::OnService);

    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, 4, 300.0));
    assert!(train.ats_p().unwrap().state().is_engaged());
    let output = train.elapse(&input(0.0, 20.0, 0));
    assert_eq!(output.indicators[indicator::SX_POWER], 0);

    train.set_beacon(&BeaconData::new(ats_sx::BEACON_S_LONG, 0, 0, 600.0));
    let output = train.elapse(&input(1.0, 20.0, 0));
    assert_eq!(sx_state(&train), ats_sx::State::Normal);
    assert_eq!(output.indicators[indicator::SX_ALARM], 0);
}

#[test]
fn test_ats_p_takes_over_sx_emergency() {
    let config = TrainConfig {
        ats_sx: Some(AtsSxConfig::default()),
        ats_p: Some(AtsPConfig::default()),
        ..TrainConfig::default()
    };
    let mut train = Train::new(&config);
    train.initialize(InitializationMode::OnService);

    train.set_beacon(&BeaconData::new(ats_sx::BEACON_IMMEDIATE_STOP, 0, 0, 0.0));
    assert_eq!(sx_state(&train), ats_sx::State::Emergency);
    let output = train.elapse(&input(0.0, 10.0, 0));
    assert_eq!(output.handles.brake, train.specs().emergency_notch());

    // Once ATS-P engages, its supervision replaces the Sx emergency
    train.set_beacon(&BeaconData::new(ats_p::BEACON_RENEWAL, 0, 4, 300.0));
    let output = train.elapse(&input(1.0, 10.0, 0));
    assert_eq!(train.ats_p().unwrap().state(), ats_p::State::Normal);
    assert_eq!(sx_state(&train), ats_sx::State::Normal);
    assert_eq!(output.handles.brake, 0);
    assert_eq!(output.indicators[indicator::SX_POWER], 0);
}
