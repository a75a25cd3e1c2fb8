//! EB: driver vigilance watchdog.

use super::{Device, DeviceKind, DeviceState, InitializationMode, Tick};
use crate::cab::{BeaconData, CabStatus, DoorState, HandleChange, HornKind, Key, SignalData};
use crate::output::{indicator, Sound};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Monitoring,
    Bell,
    Brake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbConfig {
    pub bell_threshold: f64,
    pub brake_threshold: f64,
    /// Below this speed the timer is held at zero.
    pub standstill_speed: f64,
    pub reset_keys: Vec<Key>,
}

impl Default for EbConfig {
    fn default() -> Self {
        Self {
            bell_threshold: 60.0,
            brake_threshold: 65.0,
            standstill_speed: 5.0 / 3.6,
            reset_keys: vec![Key::A2],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Eb {
    config: EbConfig,
    state: State,
    counter: f64,
}

impl Eb {
    pub fn new(config: EbConfig) -> Self {
        Self {
            config,
            state: State::Monitoring,
            counter: 0.0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &EbConfig {
        &self.config
    }

    /// Seconds since the last qualifying driver action.
    pub fn counter(&self) -> f64 {
        self.counter
    }

    pub fn reset(&mut self) {
        self.counter = 0.0;
        self.set_state(State::Monitoring);
    }

    fn set_state(&mut self, next: State) {
        if self.state != next {
            debug!("EB {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

impl Device for Eb {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Eb
    }

    fn device_state(&self) -> DeviceState {
        DeviceState::Eb(self.state)
    }

    fn supervised_speed(&self) -> Option<f64> {
        None
    }

    fn initialize(&mut self, _mode: InitializationMode, _cab: &CabStatus) {
        self.reset();
    }

    fn elapse(&mut self, tick: &mut Tick<'_>) {
        let cab = tick.cab;
        if cab.speed() < self.config.standstill_speed && self.state != State::Brake {
            self.counter = 0.0;
        } else {
            self.counter += tick.elapsed;
        }

        // The brake holds until the driver responds
        if self.state != State::Brake {
            if self.counter >= self.config.brake_threshold {
                self.set_state(State::Brake);
            } else if self.counter >= self.config.bell_threshold {
                self.set_state(State::Bell);
            } else {
                self.set_state(State::Monitoring);
            }
        }

        match self.state {
            State::Monitoring => {}
            State::Bell => {
                tick.out.set_indicator(indicator::EB_WARNING, 1);
                tick.out.keep_playing(Sound::EbBell);
            }
            State::Brake => {
                tick.out.set_indicator(indicator::EB_WARNING, 1);
                tick.out.keep_playing(Sound::EbBell);
                tick.handles.apply_brake(cab.specs.emergency_notch());
                tick.out.debug("EB brake");
            }
        }
    }

    fn key_down(&mut self, key: Key, _cab: &CabStatus) {
        if self.config.reset_keys.contains(&key) {
            self.reset();
        }
    }

    fn key_up(&mut self, _key: Key, _cab: &CabStatus) {}

    fn set_signal(&mut self, _signals: &[SignalData], _cab: &CabStatus) {}

    fn set_beacon(&mut self, _beacon: &BeaconData, _cab: &CabStatus) {}

    fn door_change(&mut self, _old: DoorState, _new: DoorState, _cab: &CabStatus) {}

    fn horn_blow(&mut self, _horn: HornKind, _cab: &CabStatus) {
        self.reset();
    }

    fn handle_change(&mut self, _change: HandleChange, _cab: &CabStatus) {
        self.reset();
    }
}
