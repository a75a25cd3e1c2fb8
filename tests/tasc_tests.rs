use cabsignal::cab::{BeaconData, DoorState, Handles, Key, TickInput, VehicleKinematics};
use cabsignal::devices::{tasc, TascConfig};
use cabsignal::output::{indicator, Sound, SoundCommand, SoundEvent};
use cabsignal::sim::{Simulation, VehicleModel};
use cabsignal::{InitializationMode, Train, TrainConfig};

fn tasc_train() -> Train {
    let config = TrainConfig {
        tasc: Some(TascConfig::default()),
        ..TrainConfig::default()
    };
    let mut train = Train::new(&config);
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

fn tasc_state(train: &Train) -> tasc::State {
    train.tasc().map(|tasc| tasc.state()).unwrap()
}

fn stop_point(distance: i32) -> BeaconData {
    BeaconData::new(tasc::BEACON_STOP_POINT, distance, 0, 0.0)
}

#[test]
fn test_stops_at_stop_point() {
    let train = tasc_train();
    let vehicle = VehicleModel::new(*train.specs()).at(0.0, 8.0);
    let mut sim = Simulation::new(train, vehicle, 0.1);

    sim.step();
    sim.train.set_beacon(&stop_point(50));
    assert_eq!(tasc_state(&sim.train), tasc::State::Pattern);

    let output = sim.step();
    assert!(sim.train.tasc().unwrap().is_approach_confirmed());
    assert!(output.handles.brake > 0);
    assert_eq!(output.indicators[indicator::TASC_PATTERN], 1);
    assert!(output
        .sounds
        .iter()
        .any(|event| *event == SoundEvent { sound: Sound::TascAnnounce, command: SoundCommand::PlayOnce }));

    let mut previous = output.handles.brake;
    while sim.vehicle.speed > 0.0 && sim.time() < 60.0 {
        let output = sim.step();
        assert!(output.handles.brake >= previous, "notch fell at {:.2} m", sim.vehicle.location);
        previous = output.handles.brake;
    }
    assert_eq!(sim.vehicle.speed, 0.0);
    assert!((sim.vehicle.location - 50.0).abs() < 1.0, "stopped at {}", sim.vehicle.location);
    assert_eq!(tasc_state(&sim.train), tasc::State::Pattern);

    // Holds the brake at the stop
    let output = sim.step();
    assert!(output.handles.brake > 0);
}

#[test]
fn test_notch_only_rises_into_stop() {
    let train = tasc_train();
    let vehicle = VehicleModel::new(*train.specs()).at(0.0, 15.0);
    let mut sim = Simulation::new(train, vehicle, 0.1);
    sim.train.set_beacon(&stop_point(200));

    let mut notches = Vec::new();
    while sim.vehicle.speed > 0.0 && sim.time() < 120.0 {
        let output = sim.step();
        assert_eq!(tasc_state(&sim.train), tasc::State::Pattern);
        notches.push(output.handles.brake);
    }
    // Held at the initial notch first, then raised step by step
    assert_eq!(notches[0], TascConfig::default().initial_notch);
    assert!(notches.windows(2).all(|pair| pair[1] >= pair[0]), "{:?}", notches);
    assert!(notches.iter().any(|&notch| notch > 1));
    assert!((sim.vehicle.location - 200.0).abs() < 1.0, "stopped at {}", sim.vehicle.location);
}

#[test]
fn test_doors_release_stop() {
    let mut train = tasc_train();
    train.set_beacon(&stop_point(50));
    train.elapse(&input(49.8, 0.0));

    let mut open = input(49.8, 0.0);
    open.doors = DoorState::Open;
    let output = train.elapse(&open);
    assert_eq!(tasc_state(&train), tasc::State::Pattern);
    assert_eq!(output.handles.brake, train.specs().brake_notches);

    let output = train.elapse(&input(49.8, 0.0));
    assert_eq!(tasc_state(&train), tasc::State::Released);
    assert_eq!(output.handles.brake, 0);

    // Reset once well clear of the stop
    train.elapse(&input(90.0, 10.0));
    assert_eq!(tasc_state(&train), tasc::State::Released);
    train.elapse(&input(101.0, 10.0));
    assert_eq!(tasc_state(&train), tasc::State::Normal);
    assert_eq!(train.tasc().unwrap().stop_position(), None);
}

#[test]
fn test_brake_control_limits_initial_notch() {
    let mut train = tasc_train();
    train.set_beacon(&stop_point(200));

    let output = train.elapse(&input(0.0, 15.0));
    assert_eq!(output.handles.brake, TascConfig::default().initial_notch);
    assert!(train.tasc().unwrap().brake_control_countdown() > 0.0);

    let mut output = output;
    for _ in 0..30 {
        output = train.elapse(&input(0.0, 15.0));
    }
    assert!(output.handles.brake >= 2);
    assert!(train.tasc().unwrap().brake_control_countdown() <= 0.0);
}

#[test]
fn test_same_stop_keeps_confirmation() {
    let mut train = tasc_train();
    train.set_beacon(&stop_point(50));
    train.elapse(&input(0.0, 8.0));
    assert!(train.tasc().unwrap().is_approach_confirmed());

    train.elapse(&input(10.0, 8.0));
    train.set_beacon(&stop_point(40));
    assert!(train.tasc().unwrap().is_approach_confirmed());

    train.set_beacon(&stop_point(100));
    assert!(!train.tasc().unwrap().is_approach_confirmed());
    assert_eq!(train.tasc().unwrap().stop_position(), Some(110.0));
}

#[test]
fn test_override_suspends_braking() {
    let mut train = tasc_train();
    train.set_beacon(&stop_point(50));
    let output = train.elapse(&input(0.0, 8.0));
    assert!(output.handles.brake > 0);

    train.key_down(Key::F);
    let output = train.elapse(&input(1.0, 8.0));
    assert_eq!(output.handles.brake, 0);
    assert_eq!(output.indicators[indicator::TASC_OVERRIDE], 1);
    assert_eq!(tasc_state(&train), tasc::State::Pattern);

    train.key_down(Key::F);
    let output = train.elapse(&input(2.0, 8.0));
    assert!(output.handles.brake > 0);
}

#[test]
fn test_overrun_releases() {
    let mut train = tasc_train();
    train.set_beacon(&stop_point(50));
    train.elapse(&input(0.0, 8.0));

    train.elapse(&input(50.8, 1.0));
    assert_eq!(tasc_state(&train), tasc::State::Pattern);

    let output = train.elapse(&input(52.0, 1.0));
    assert_eq!(tasc_state(&train), tasc::State::Released);
    assert_eq!(output.handles.brake, 0);
}

#[test]
fn test_cancel_and_invalid_beacons() {
    let mut train = tasc_train();
    train.set_beacon(&stop_point(0));
    assert_eq!(tasc_state(&train), tasc::State::Normal);

    train.set_beacon(&BeaconData::new(tasc::BEACON_STOP_POINT, 0, 0, 80.0));
    assert_eq!(train.tasc().unwrap().stop_position(), Some(80.0));

    train.set_beacon(&BeaconData::new(tasc::BEACON_CANCEL, 0, 0, 0.0));
    assert_eq!(tasc_state(&train), tasc::State::Normal);
    let output = train.elapse(&input(0.0, 8.0));
    assert_eq!(output.handles.brake, 0);
    assert_eq!(output.indicators[indicator::TASC_POWER], 1);
}

#[test]
fn test_home_door_alignment() {
    let mut train = tasc_train();
    train.set_beacon(&BeaconData::new(tasc::BEACON_HOME_DOOR, 0, 0, 0.0));
    train.set_beacon(&stop_point(50));

    let output = train.elapse(&input(49.0, 0.5));
    assert_eq!(output.indicators[indicator::TASC_HOME_DOOR], 0);
    let output = train.elapse(&input(49.8, 0.0));
    assert_eq!(output.indicators[indicator::TASC_HOME_DOOR], 1);
}
