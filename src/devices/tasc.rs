//! TASC: automatic brake control for precise station stops.

use super::{Device, DeviceKind, DeviceState, InitializationMode, Tick};
use crate::approach::{Approach, ApproachParameters};
use crate::cab::{BeaconData, CabStatus, DoorState, HandleChange, HornKind, Key, SignalData};
use crate::output::{indicator, Sound};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BEACON_STOP_POINT: i32 = 30;
pub const BEACON_HOME_DOOR: i32 = 31;
pub const BEACON_CANCEL: i32 = 32;

/// Re-delivered stop points closer than this are the same stop.
const SAME_STOP_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Normal,
    Pattern,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TascConfig {
    /// Deceleration the stop is planned around, m/s².
    pub deceleration: f64,
    /// Home-door alignment window around the stop point, m.
    pub stop_tolerance: f64,
    pub release_distance: f64,
    pub reset_distance: f64,
    pub brake_control_speed: f64,
    /// Seconds of limited authority per required notch.
    pub notch_delay: f64,
    pub initial_notch: u32,
}

impl Default for TascConfig {
    fn default() -> Self {
        Self {
            deceleration: 2.0 / 3.6,
            stop_tolerance: 0.35,
            release_distance: 1.0,
            reset_distance: 50.0,
            brake_control_speed: 30.0 / 3.6,
            notch_delay: 0.5,
            initial_notch: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tasc {
    config: TascConfig,
    state: State,
    stop_position: Option<f64>,
    home_door: bool,
    approach: Approach,
    notch: u32,
    brake_control_countdown: f64,
    brake_control_armed: bool,
    override_active: bool,
    doors_opened_at_stop: bool,
    announced: State,
}

impl Tasc {
    pub fn new(config: TascConfig) -> Self {
        Self {
            config,
            state: State::Normal,
            stop_position: None,
            home_door: false,
            approach: Approach::new(),
            notch: 0,
            brake_control_countdown: 0.0,
            brake_control_armed: false,
            override_active: false,
            doors_opened_at_stop: false,
            announced: State::Normal,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &TascConfig {
        &self.config
    }

    pub fn stop_position(&self) -> Option<f64> {
        self.stop_position
    }

    /// Notch demanded on the last tick.
    pub fn notch(&self) -> u32 {
        self.notch
    }

    pub fn is_approach_confirmed(&self) -> bool {
        self.approach.is_confirmed()
    }

    pub fn is_override_active(&self) -> bool {
        self.override_active
    }

    pub fn brake_control_countdown(&self) -> f64 {
        self.brake_control_countdown
    }

    fn set_state(&mut self, next: State) {
        if self.state != next {
            debug!("TASC {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn reset(&mut self) {
        self.stop_position = None;
        self.home_door = false;
        self.approach.reset();
        self.notch = 0;
        self.brake_control_countdown = 0.0;
        self.brake_control_armed = false;
        self.doors_opened_at_stop = false;
        self.set_state(State::Normal);
    }

    fn is_aligned(&self, location: f64) -> bool {
        self.stop_position
            .map_or(false, |stop| (stop - location).abs() <= self.config.stop_tolerance)
    }

    fn required_notch(&mut self, tick: &Tick<'_>, distance: f64) -> u32 {
        let cab = tick.cab;
        let max_notch = cab.specs.brake_notches;
        if cab.doors.is_open() {
            return max_notch;
        }
        let params = ApproachParameters {
            max_notch,
            max_deceleration: cab.specs.max_deceleration,
            nominal_deceleration: self.config.deceleration,
        };
        let speed = cab.speed();
        // Trails the demand so the notch only rises on the way into the stop
        let mut notch = self.approach.trailing_notch(speed, 0.0, distance, self.notch, &params);

        if self.brake_control_armed && notch > 0 {
            self.brake_control_countdown = f64::from(notch) * self.config.notch_delay;
            self.brake_control_armed = false;
        }
        if self.brake_control_countdown > 0.0 {
            if speed >= self.config.brake_control_speed {
                self.brake_control_countdown -= tick.elapsed;
                notch = notch.min(self.config.initial_notch);
            } else {
                self.brake_control_countdown = 0.0;
            }
        }
        notch
    }
}

impl Device for Tasc {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Tasc
    }

    fn device_state(&self) -> DeviceState {
        DeviceState::Tasc(self.state)
    }

    fn supervised_speed(&self) -> Option<f64> {
        None
    }

    fn initialize(&mut self, _mode: InitializationMode, _cab: &CabStatus) {
        self.override_active = false;
        self.reset();
        self.announced = self.state;
    }

    fn elapse(&mut self, tick: &mut Tick<'_>) {
        let cab = tick.cab;
        let location = cab.location();

        match self.state {
            State::Normal => self.notch = 0,
            State::Pattern => match self.stop_position {
                None => self.reset(),
                Some(stop) => {
                    let distance = stop - location;
                    if distance < -self.config.release_distance
                        || (self.doors_opened_at_stop && !cab.doors.is_open())
                    {
                        self.notch = 0;
                        self.set_state(State::Released);
                    } else if self.override_active {
                        self.notch = 0;
                    } else {
                        self.notch = self.required_notch(tick, distance);
                        tick.handles.apply_brake(self.notch);
                    }
                }
            },
            State::Released => {
                self.notch = 0;
                let far_past = self
                    .stop_position
                    .map_or(true, |stop| location - stop > self.config.reset_distance);
                if far_past {
                    self.reset();
                }
            }
        }

        if self.state != self.announced {
            if self.state == State::Pattern {
                tick.out.play(Sound::TascAnnounce);
            }
            self.announced = self.state;
        }

        tick.out.set_indicator(indicator::TASC_POWER, 1);
        if self.state == State::Pattern {
            tick.out.set_indicator(indicator::TASC_PATTERN, 1);
            tick.out.set_indicator(indicator::TASC_NOTCH, self.notch as i32);
            if let Some(stop) = self.stop_position {
                tick.out.debug(&format!("TASC {:.2}m notch {}", stop - location, self.notch));
            }
        }
        if self.home_door && self.is_aligned(location) {
            tick.out.set_indicator(indicator::TASC_HOME_DOOR, 1);
        }
        if self.override_active {
            tick.out.set_indicator(indicator::TASC_OVERRIDE, 1);
        }
    }

    fn key_down(&mut self, key: Key, _cab: &CabStatus) {
        if key == Key::F {
            self.override_active = !self.override_active;
            debug!("TASC override {}", self.override_active);
        }
    }

    fn key_up(&mut self, _key: Key, _cab: &CabStatus) {}

    fn set_signal(&mut self, _signals: &[SignalData], _cab: &CabStatus) {}

    fn set_beacon(&mut self, beacon: &BeaconData, cab: &CabStatus) {
        let location = cab.location();
        match beacon.kind {
            BEACON_STOP_POINT => {
                let distance = if beacon.optional > 0 {
                    f64::from(beacon.optional)
                } else {
                    beacon.signal_distance
                };
                if distance <= 0.0 || !distance.is_finite() {
                    debug!("TASC ignores stop point at {} m", distance);
                    return;
                }
                let stop = location + distance;
                let same_stop = self.state == State::Pattern
                    && self
                        .stop_position
                        .map_or(false, |existing| (existing - stop).abs() < SAME_STOP_TOLERANCE);
                if same_stop {
                    return;
                }
                self.stop_position = Some(stop);
                self.approach.reset();
                self.brake_control_armed = true;
                self.brake_control_countdown = 0.0;
                self.doors_opened_at_stop = false;
                self.set_state(State::Pattern);
            }
            BEACON_HOME_DOOR => self.home_door = true,
            BEACON_CANCEL => self.reset(),
            _ => {}
        }
    }

    fn door_change(&mut self, _old: DoorState, new: DoorState, cab: &CabStatus) {
        if self.state == State::Pattern && new.is_open() && cab.is_stopped() {
            self.doors_opened_at_stop = true;
        }
    }

    fn horn_blow(&mut self, _horn: HornKind, _cab: &CabStatus) {}

    fn handle_change(&mut self, _change: HandleChange, _cab: &CabStatus) {}
}
