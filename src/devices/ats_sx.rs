//! ATS-Sx: intermittent warning-type train stop.

use super::{Device, DeviceKind, DeviceState, InitializationMode, Tick};
use crate::cab::{BeaconData, CabStatus, DoorState, HandleChange, HornKind, Key, SignalData, NO_SIGNAL_ASPECT};
use crate::output::{indicator, Sound};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BEACON_S_LONG: i32 = 0;
pub const BEACON_IMMEDIATE_STOP: i32 = 1;
pub const BEACON_ACCIDENTAL_DEPARTURE: i32 = 2;
pub const BEACON_SPEED_CHECK_ARM: i32 = 12;
pub const BEACON_SPEED_CHECK: i32 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Disabled,
    /// Powered, waiting for the emergency brake before initializing.
    Suppressed,
    Initializing,
    Chime,
    Normal,
    Alarm,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtsSxConfig {
    pub alarm_duration: f64,
    pub initialization_duration: f64,
    pub speed_check_duration: f64,
    pub reset_speed: f64,
    pub alarm_aspect: i32,
}

impl Default for AtsSxConfig {
    fn default() -> Self {
        Self {
            alarm_duration: 5.0,
            initialization_duration: 3.0,
            speed_check_duration: 0.5,
            reset_speed: 5.0 / 3.6,
            alarm_aspect: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AtsSx {
    config: AtsSxConfig,
    state: State,
    alarm_countdown: f64,
    initialization_countdown: f64,
    speed_check_countdown: f64,
    /// Position of the signal that raised the current alarm.
    signal_position: Option<f64>,
    blocked: bool,
}

impl AtsSx {
    pub fn new(config: AtsSxConfig) -> Self {
        Self {
            config,
            state: State::Suppressed,
            alarm_countdown: 0.0,
            initialization_countdown: 0.0,
            speed_check_countdown: 0.0,
            signal_position: None,
            blocked: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &AtsSxConfig {
        &self.config
    }

    pub fn alarm_countdown(&self) -> f64 {
        self.alarm_countdown
    }

    pub fn is_speed_check_armed(&self) -> bool {
        self.speed_check_countdown > 0.0
    }

    fn set_state(&mut self, next: State) {
        if self.state != next {
            debug!("ATS-Sx {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn raise_alarm(&mut self, signal_position: f64) {
        self.alarm_countdown = self.config.alarm_duration;
        self.signal_position = Some(signal_position);
        self.set_state(State::Alarm);
    }

    fn is_watching(&self) -> bool {
        matches!(self.state, State::Chime | State::Normal)
    }
}

impl Device for AtsSx {
    fn kind(&self) -> DeviceKind {
        DeviceKind::AtsSx
    }

    fn device_state(&self) -> DeviceState {
        DeviceState::AtsSx(self.state)
    }

    fn supervised_speed(&self) -> Option<f64> {
        None
    }

    fn initialize(&mut self, mode: InitializationMode, _cab: &CabStatus) {
        self.alarm_countdown = 0.0;
        self.initialization_countdown = 0.0;
        self.speed_check_countdown = 0.0;
        self.signal_position = None;
        let state = match mode {
            InitializationMode::OnService => State::Normal,
            InitializationMode::OnEmergency => State::Suppressed,
            InitializationMode::OffEmergency => State::Disabled,
        };
        self.set_state(state);
    }

    fn elapse(&mut self, tick: &mut Tick<'_>) {
        let dt = tick.elapsed;
        let cab = tick.cab;

        if self.state == State::Suppressed && cab.handles.brake >= cab.specs.emergency_notch() {
            self.initialization_countdown = self.config.initialization_duration;
            self.set_state(State::Initializing);
        }
        if self.state == State::Initializing {
            self.initialization_countdown -= dt;
            if self.initialization_countdown <= 0.0 {
                self.set_state(State::Chime);
            }
        }

        self.blocked = *tick.blocking;
        if self.blocked {
            // ATS-P or ATC supervises and owns any stop Sx was enforcing,
            // including an emergency for a passed red
            if matches!(self.state, State::Chime | State::Alarm | State::Emergency) {
                self.set_state(State::Normal);
            }
            self.speed_check_countdown = 0.0;
        } else {
            if self.state == State::Alarm {
                self.alarm_countdown -= dt;
                if self.alarm_countdown <= 0.0 {
                    self.set_state(State::Emergency);
                }
            }
            if self.speed_check_countdown > 0.0 {
                self.speed_check_countdown = (self.speed_check_countdown - dt).max(0.0);
            }
            if self.state == State::Emergency {
                tick.handles.apply_brake(cab.specs.emergency_notch());
            }
        }

        let powered = !matches!(self.state, State::Disabled | State::Suppressed);
        if powered && !self.blocked {
            tick.out.set_indicator(indicator::SX_POWER, 1);
        }
        match self.state {
            State::Alarm => {
                tick.out.set_indicator(indicator::SX_ALARM, 1);
                tick.out.keep_playing(Sound::AtsBell);
            }
            State::Emergency => {
                tick.out.set_indicator(indicator::SX_ALARM, 1);
                tick.out.set_indicator(indicator::SX_EMERGENCY, 1);
                tick.out.keep_playing(Sound::AtsBell);
            }
            State::Chime => tick.out.keep_playing(Sound::AtsChime),
            _ => {}
        }
        if powered {
            tick.out.debug(&format!("Sx {:?}", self.state));
        }
    }

    fn key_down(&mut self, key: Key, cab: &CabStatus) {
        match key {
            Key::S => {
                if self.state == State::Alarm && cab.handles.brake >= cab.specs.ats_notch {
                    self.set_state(State::Chime);
                }
            }
            Key::A1 => {
                if self.state == State::Chime {
                    let passed = self.signal_position.map_or(true, |position| cab.location() >= position);
                    if passed || cab.speed() < self.config.reset_speed {
                        self.signal_position = None;
                        self.set_state(State::Normal);
                    }
                }
            }
            Key::B1 => {
                if self.state == State::Emergency && cab.is_stopped() {
                    self.set_state(State::Chime);
                }
            }
            Key::D => {
                if self.state == State::Disabled {
                    self.set_state(State::Suppressed);
                } else {
                    self.alarm_countdown = 0.0;
                    self.speed_check_countdown = 0.0;
                    self.set_state(State::Disabled);
                }
            }
            _ => {}
        }
    }

    fn key_up(&mut self, _key: Key, _cab: &CabStatus) {}

    fn set_signal(&mut self, _signals: &[SignalData], _cab: &CabStatus) {}

    fn set_beacon(&mut self, beacon: &BeaconData, cab: &CabStatus) {
        if self.blocked || !matches!(self.state, State::Chime | State::Normal | State::Alarm) {
            return;
        }
        match beacon.kind {
            BEACON_S_LONG => {
                let aspect = beacon.signal_aspect;
                if self.is_watching() && aspect < NO_SIGNAL_ASPECT && aspect <= self.config.alarm_aspect {
                    self.raise_alarm(cab.location() + beacon.signal_distance.max(0.0));
                }
            }
            BEACON_IMMEDIATE_STOP => {
                if beacon.signal_is_red() {
                    self.set_state(State::Emergency);
                }
            }
            BEACON_ACCIDENTAL_DEPARTURE => {
                if beacon.signal_is_red() && !cab.is_stopped() {
                    self.set_state(State::Emergency);
                }
            }
            BEACON_SPEED_CHECK_ARM => {
                self.speed_check_countdown = if beacon.optional > 0 {
                    f64::from(beacon.optional) / 1000.0
                } else {
                    self.config.speed_check_duration
                };
            }
            BEACON_SPEED_CHECK => {
                // Reaching the second beacon inside the window means overspeed
                if self.speed_check_countdown > 0.0 && self.is_watching() {
                    self.speed_check_countdown = 0.0;
                    self.raise_alarm(cab.location());
                }
            }
            _ => {}
        }
    }

    fn door_change(&mut self, _old: DoorState, _new: DoorState, _cab: &CabStatus) {}

    fn horn_blow(&mut self, _horn: HornKind, _cab: &CabStatus) {}

    fn handle_change(&mut self, _change: HandleChange, _cab: &CabStatus) {}
}
