//! ATS-Ps: continuous pattern supervision on a handful of fixed patterns.

use super::{Device, DeviceKind, DeviceState, InitializationMode, Tick};
use crate::cab::{BeaconData, CabStatus, DoorState, HandleChange, HornKind, Key, SignalData, NO_SIGNAL_ASPECT};
use crate::output::{indicator, Sound};
use crate::pattern::{CurveParameters, Pattern, SpeedLimit, TargetPosition};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BEACON_SIGNAL: i32 = 20;
pub const BEACON_CLEAR_SIGNAL: i32 = 21;
pub const BEACON_TEMPORARY: i32 = 22;
pub const BEACON_CLEAR_TEMPORARY: i32 = 23;
pub const BEACON_ROUTE_PERMANENT: i32 = 24;

/// Signal patterns are dropped this far past their target.
const PASSED_SIGNAL_MARGIN: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Disabled,
    Standby,
    Normal,
    Pattern,
    Approaching,
    Brake,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtsPsConfig {
    pub curve: CurveParameters,
    /// Target speed of the approach pattern set by a restrictive aspect.
    pub approach_speed: f64,
    pub maximum_speed: Option<f64>,
}

impl Default for AtsPsConfig {
    fn default() -> Self {
        Self {
            curve: CurveParameters::default(),
            approach_speed: 25.0 / 3.6,
            maximum_speed: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Patterns {
    signal: Pattern,
    approach: Pattern,
    temporary: Pattern,
    route_permanent: Pattern,
    train_permanent: Pattern,
}

impl Patterns {
    fn new(maximum_speed: Option<f64>) -> Self {
        let train_permanent = match maximum_speed {
            Some(speed) => Pattern::persistent(SpeedLimit::Limit(speed)),
            None => Pattern::unlimited(),
        };
        Self {
            signal: Pattern::unlimited(),
            approach: Pattern::unlimited(),
            temporary: Pattern::unlimited(),
            route_permanent: Pattern::unlimited(),
            train_permanent,
        }
    }

    fn all(&self) -> [&Pattern; 5] {
        [
            &self.signal,
            &self.approach,
            &self.temporary,
            &self.route_permanent,
            &self.train_permanent,
        ]
    }

    fn all_mut(&mut self) -> [&mut Pattern; 5] {
        [
            &mut self.signal,
            &mut self.approach,
            &mut self.temporary,
            &mut self.route_permanent,
            &mut self.train_permanent,
        ]
    }

    fn clear_track(&mut self) {
        for pattern in self.all_mut() {
            pattern.clear();
        }
    }
}

#[derive(Debug, Clone)]
pub struct AtsPs {
    config: AtsPsConfig,
    state: State,
    patterns: Patterns,
    blocked: bool,
    announced: State,
}

impl AtsPs {
    pub fn new(config: AtsPsConfig) -> Self {
        Self {
            config,
            state: State::Standby,
            patterns: Patterns::new(config.maximum_speed),
            blocked: false,
            announced: State::Standby,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &AtsPsConfig {
        &self.config
    }

    pub fn signal_pattern(&self) -> &Pattern {
        &self.patterns.signal
    }

    pub fn approach_pattern(&self) -> &Pattern {
        &self.patterns.approach
    }

    pub fn temporary_pattern(&self) -> &Pattern {
        &self.patterns.temporary
    }

    pub fn route_permanent_pattern(&self) -> &Pattern {
        &self.patterns.route_permanent
    }

    pub fn train_permanent_pattern(&self) -> &Pattern {
        &self.patterns.train_permanent
    }

    /// Lowest brake speed over the active patterns.
    pub fn brake_speed(&self) -> f64 {
        self.patterns
            .all()
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.brake_speed())
            .fold(f64::INFINITY, f64::min)
    }

    pub fn warning_speed(&self) -> f64 {
        self.patterns
            .all()
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.warning_speed())
            .fold(f64::INFINITY, f64::min)
    }

    fn set_state(&mut self, next: State) {
        if self.state != next {
            debug!("ATS-Ps {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn is_engaged(&self) -> bool {
        !matches!(self.state, State::Disabled | State::Standby)
    }

    fn update_patterns(&mut self, location: f64) {
        let curve = self.config.curve;
        // Fixed-position limits stay in force once the train is past their start
        let temporary = &mut self.patterns.temporary;
        if let TargetPosition::At(position) = temporary.target() {
            if location >= position {
                let speed = temporary.target_speed();
                temporary.set(TargetPosition::Immediate, speed);
            }
        }
        for pattern in self.patterns.all_mut() {
            pattern.update(location, &curve);
        }
    }

    /// Emergency when the stop pattern's point is passed too fast; the
    /// signal and approach patterns are dropped well past their point.
    fn check_passed_signal(&mut self, location: f64, speed: f64) {
        if let TargetPosition::At(position) = self.patterns.signal.target() {
            if location > position {
                if speed > self.patterns.signal.brake_speed() {
                    self.set_state(State::Emergency);
                } else if location > position + PASSED_SIGNAL_MARGIN {
                    self.patterns.signal.clear();
                }
            }
        }
        if let TargetPosition::At(position) = self.patterns.approach.target() {
            if location > position + PASSED_SIGNAL_MARGIN {
                self.patterns.approach.clear();
            }
        }
    }

    fn supervise(&mut self, speed: f64) -> State {
        let brake = self.brake_speed();
        let warning = self.warning_speed();
        if speed > brake {
            State::Brake
        } else if speed >= warning {
            State::Approaching
        } else if self.patterns.all().iter().any(|p| p.is_active()) {
            State::Pattern
        } else {
            State::Normal
        }
    }

    fn announce(&mut self, tick: &mut Tick<'_>) {
        if self.state != self.announced {
            match self.state {
                State::Approaching => tick.out.play(Sound::AtsPsApproach),
                State::Brake | State::Emergency => tick.out.play(Sound::AtsPsBrake),
                _ => {}
            }
            self.announced = self.state;
        }
    }
}

impl Device for AtsPs {
    fn kind(&self) -> DeviceKind {
        DeviceKind::AtsPs
    }

    fn device_state(&self) -> DeviceState {
        DeviceState::AtsPs(self.state)
    }

    fn supervised_speed(&self) -> Option<f64> {
        if self.is_engaged() {
            Some(self.brake_speed()).filter(|speed| speed.is_finite())
        } else {
            None
        }
    }

    fn initialize(&mut self, mode: InitializationMode, _cab: &CabStatus) {
        self.patterns.clear_track();
        let state = match mode {
            InitializationMode::OffEmergency => State::Disabled,
            InitializationMode::OnService | InitializationMode::OnEmergency => State::Standby,
        };
        self.set_state(state);
        self.announced = self.state;
    }

    fn elapse(&mut self, tick: &mut Tick<'_>) {
        let cab = tick.cab;
        let location = cab.location();
        let speed = cab.speed();

        self.blocked = *tick.blocking;
        if self.state == State::Disabled {
            self.announced = self.state;
            return;
        }
        if self.blocked {
            if self.state != State::Standby {
                self.patterns.clear_track();
                self.set_state(State::Standby);
            }
        } else {
            if self.state == State::Standby {
                self.set_state(State::Normal);
            }
            self.update_patterns(location);
            if self.state != State::Emergency {
                self.check_passed_signal(location, speed);
            }
            match self.state {
                State::Emergency => {}
                State::Brake => {
                    if speed < self.config.curve.release_speed && !cab.doors.is_open() {
                        let next = self.supervise(speed);
                        self.set_state(next);
                    }
                }
                _ => {
                    let next = self.supervise(speed);
                    self.set_state(next);
                }
            }
            match self.state {
                State::Brake => tick.handles.apply_brake(cab.specs.brake_notches),
                State::Emergency => tick.handles.apply_brake(cab.specs.emergency_notch()),
                _ => {}
            }
        }

        self.announce(tick);
        tick.out.set_indicator(indicator::PS_POWER, 1);
        match self.state {
            State::Pattern => tick.out.set_indicator(indicator::PS_PATTERN, 1),
            State::Approaching => {
                tick.out.set_indicator(indicator::PS_PATTERN, 1);
                tick.out.set_indicator(indicator::PS_APPROACH, 1);
            }
            State::Brake | State::Emergency => {
                tick.out.set_indicator(indicator::PS_PATTERN, 1);
                tick.out.set_indicator(indicator::PS_BRAKE, 1);
            }
            _ => {}
        }
        if self.is_engaged() {
            tick.out.debug(&format!("Ps {:?} {:.0}km/h", self.state, self.brake_speed() * 3.6));
        }
    }

    fn key_down(&mut self, key: Key, cab: &CabStatus) {
        match key {
            Key::B1 => {
                if self.state == State::Emergency && cab.is_stopped() {
                    self.patterns.signal.clear();
                    self.set_state(State::Normal);
                }
            }
            Key::D => {
                if self.state == State::Disabled {
                    self.set_state(State::Standby);
                } else {
                    self.patterns.clear_track();
                    self.set_state(State::Disabled);
                }
            }
            _ => {}
        }
    }

    fn key_up(&mut self, _key: Key, _cab: &CabStatus) {}

    fn set_signal(&mut self, _signals: &[SignalData], _cab: &CabStatus) {}

    fn set_beacon(&mut self, beacon: &BeaconData, cab: &CabStatus) {
        if self.blocked || self.state == State::Disabled {
            return;
        }
        let location = cab.location();
        match beacon.kind {
            BEACON_SIGNAL => {
                let distance = if beacon.optional > 0 {
                    f64::from(beacon.optional)
                } else {
                    beacon.signal_distance
                };
                let position = TargetPosition::At(location + distance.max(0.0));
                let aspect = beacon.signal_aspect;
                if beacon.signal_is_red() {
                    self.patterns.signal.set(position, SpeedLimit::Limit(0.0));
                    self.patterns.approach.clear();
                } else if aspect < NO_SIGNAL_ASPECT && aspect <= 2 {
                    self.patterns
                        .approach
                        .set(position, SpeedLimit::Limit(self.config.approach_speed));
                    self.patterns.signal.clear();
                } else {
                    self.patterns.signal.clear();
                    self.patterns.approach.clear();
                }
            }
            BEACON_CLEAR_SIGNAL => {
                self.patterns.signal.clear();
                self.patterns.approach.clear();
            }
            BEACON_TEMPORARY => match beacon.distance_and_speed() {
                Some((distance, speed)) => self
                    .patterns
                    .temporary
                    .set(TargetPosition::At(location + distance), SpeedLimit::Limit(speed)),
                None => {
                    self.patterns.temporary.clear();
                }
            },
            BEACON_CLEAR_TEMPORARY => {
                self.patterns.temporary.clear();
            }
            BEACON_ROUTE_PERMANENT => {
                if beacon.optional > 0 {
                    let speed = f64::from(beacon.optional) / 3.6;
                    self.patterns
                        .route_permanent
                        .set(TargetPosition::Immediate, SpeedLimit::Limit(speed));
                } else {
                    self.patterns.route_permanent.clear();
                }
            }
            other => debug!("ATS-Ps ignores beacon {}", other),
        }
    }

    fn door_change(&mut self, _old: DoorState, _new: DoorState, _cab: &CabStatus) {}

    fn horn_blow(&mut self, _horn: HornKind, _cab: &CabStatus) {}

    fn handle_change(&mut self, _change: HandleChange, _cab: &CabStatus) {}
}
