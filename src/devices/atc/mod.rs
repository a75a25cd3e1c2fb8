//! ATC: cab-signalling speed control with staged service braking.
//!
//! The current aspect is looked up in the configured signal table each tick
//! and turned into a [`SignalPattern`]. When no explicit entry matches, a
//! compatibility signal is synthesised from the preceding-train gap and the
//! legacy speed limits. Supervision picks Normal, ServiceHalf, ServiceFull
//! or Emergency from the pattern; changes between the service stages wait
//! for the stage timer.

pub mod signal;

pub use signal::{
    default_signals, BlockDistance, BrakeProfile, InitialSpeed, Signal, SignalIndicator, SignalPattern, SwitchHint,
    STOP_SPEED,
};

use super::{Device, DeviceKind, DeviceState, InitializationMode, Tick};
use crate::cab::{
    BeaconData, CabStatus, DoorState, HandleChange, HornKind, Key, SignalData, NO_SIGNAL_ASPECT, STANDSTILL_SPEED,
};
use crate::output::{indicator, Sound};
use crate::pattern::{CompatibilityLimit, CompatibilityLimits};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BEACON_COMPATIBILITY: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Disabled,
    Suppressed,
    /// Switched out; ATS supervises.
    Ats,
    Normal,
    ServiceHalf,
    ServiceFull,
    Emergency,
}

impl State {
    pub fn is_supervising(self) -> bool {
        matches!(
            self,
            State::Normal | State::ServiceHalf | State::ServiceFull | State::Emergency
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtcConfig {
    pub regular: BrakeProfile,
    pub overrun: BrakeProfile,
    pub orp_release_speed: f64,
    /// Acceleration assumed when smoothing far-off patterns, m/s².
    pub acceleration: f64,
    pub long_threshold: f64,
    pub medium_threshold: f64,
    pub final_approach_margin: f64,
    pub stage_duration: f64,
    pub full_service_margin: f64,
    pub release_margin: f64,
    pub block_length: f64,
    /// Compatibility speed by number of free blocks ahead.
    pub block_speeds: Vec<f64>,
    pub maximum_speed: f64,
    pub suppression_distance: f64,
    pub emergency_operation_speed: f64,
    pub automatic_switch: bool,
    pub signals: Vec<Signal>,
}

impl Default for AtcConfig {
    fn default() -> Self {
        let kmh = |speed: f64| speed / 3.6;
        Self {
            regular: BrakeProfile {
                deceleration: kmh(2.445),
                delay: 1.0,
                offset: 0.0,
            },
            overrun: BrakeProfile {
                deceleration: kmh(1.8),
                delay: 0.5,
                offset: 0.0,
            },
            orp_release_speed: kmh(7.5),
            acceleration: kmh(2.0),
            long_threshold: 60.0,
            medium_threshold: 10.0,
            final_approach_margin: kmh(5.0),
            stage_duration: 2.0,
            full_service_margin: kmh(10.0),
            release_margin: 0.0,
            block_length: 500.0,
            block_speeds: [0.0, 0.0, 25.0, 45.0, 65.0, 75.0, 90.0, 110.0]
                .iter()
                .map(|speed| kmh(*speed))
                .collect(),
            maximum_speed: kmh(110.0),
            suppression_distance: 50.0,
            emergency_operation_speed: kmh(15.0),
            automatic_switch: false,
            signals: default_signals(),
        }
    }
}

impl AtcConfig {
    pub fn signal(&self, aspect: i32) -> Option<&Signal> {
        self.signals.iter().find(|signal| signal.aspect == aspect)
    }

    /// Compatibility speed for a gap of `distance` metres to the train ahead.
    pub fn block_speed(&self, distance: Option<f64>) -> f64 {
        let Some(distance) = distance else {
            return self.maximum_speed;
        };
        if self.block_length <= 0.0 {
            return self.maximum_speed;
        }
        let blocks = (distance / self.block_length).floor().max(0.0) as usize;
        self.block_speeds
            .get(blocks)
            .copied()
            .unwrap_or(self.maximum_speed)
            .min(self.maximum_speed)
    }
}

#[derive(Debug, Clone)]
pub struct Atc {
    config: AtcConfig,
    state: State,
    aspect: i32,
    block_start: f64,
    /// Last table entry that matched, with where it was last seen.
    last_explicit: Option<(Signal, f64)>,
    pattern: Option<SignalPattern>,
    carried_speed: f64,
    limits: CompatibilityLimits,
    stage_countdown: f64,
    emergency_operation: bool,
    switch_pending: Option<SwitchHint>,
    brake_notch: u32,
    announced: State,
}

impl Atc {
    pub fn new(config: AtcConfig) -> Self {
        let limits = CompatibilityLimits::new(config.regular.deceleration);
        let carried_speed = config.maximum_speed;
        Self {
            config,
            state: State::Suppressed,
            aspect: NO_SIGNAL_ASPECT,
            block_start: 0.0,
            last_explicit: None,
            pattern: None,
            carried_speed,
            limits,
            stage_countdown: 0.0,
            emergency_operation: false,
            switch_pending: None,
            brake_notch: 0,
            announced: State::Suppressed,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &AtcConfig {
        &self.config
    }

    pub fn pattern(&self) -> Option<&SignalPattern> {
        self.pattern.as_ref()
    }

    pub fn aspect(&self) -> i32 {
        self.aspect
    }

    pub fn stage_countdown(&self) -> f64 {
        self.stage_countdown
    }

    pub fn is_emergency_operation(&self) -> bool {
        self.emergency_operation
    }

    pub fn switch_pending(&self) -> Option<SwitchHint> {
        self.switch_pending
    }

    pub fn brake_notch(&self) -> u32 {
        self.brake_notch
    }

    pub fn compatibility_limits(&self) -> &CompatibilityLimits {
        &self.limits
    }

    fn set_state(&mut self, next: State) {
        if self.state != next {
            debug!("ATC {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Mode chosen on power-up from the last delivered aspect.
    fn initial_mode(&self) -> State {
        match self.config.signal(self.aspect) {
            Some(signal) if signal.switch_hint != Some(SwitchHint::ToAts) => State::Normal,
            _ => State::Ats,
        }
    }

    /// Signal in force at `location` and whether it came from the table.
    fn select_signal(&self, location: f64, preceding: Option<f64>) -> (Signal, bool) {
        if self.emergency_operation {
            let signal = Signal::fixed(self.aspect, SignalIndicator::X, self.config.emergency_operation_speed);
            return (signal, true);
        }
        if let Some(signal) = self.config.signal(self.aspect) {
            return (*signal, true);
        }
        if let Some((signal, seen_at)) = self.last_explicit {
            if (location - seen_at).abs() <= self.config.suppression_distance {
                return (signal, true);
            }
        }
        (self.compatibility_signal(location, preceding), false)
    }

    fn compatibility_signal(&self, location: f64, preceding: Option<f64>) -> Signal {
        let current_limit = self.limits.current().map_or(self.config.maximum_speed, |limit| limit.speed);
        let now = self.config.block_speed(preceding).min(current_limit);
        let indicator = if now <= 0.0 {
            SignalIndicator::Red
        } else {
            SignalIndicator::Green
        };
        match self.limits.upcoming().filter(|limit| limit.speed < now) {
            Some(limit) => Signal::braking(
                NO_SIGNAL_ASPECT,
                indicator,
                InitialSpeed::Speed(now),
                limit.speed,
                limit.position - location,
            ),
            None => Signal::fixed(NO_SIGNAL_ASPECT, indicator, now),
        }
    }

    fn build_pattern(&mut self, cab: &CabStatus) -> SignalPattern {
        let location = cab.location();
        let (signal, explicit) = self.select_signal(location, cab.preceding_distance);
        if !self.emergency_operation && self.config.signal(self.aspect).is_some() {
            self.last_explicit = Some((signal, location));
        }

        let previous = self.pattern;
        let same_signal = previous.map_or(false, |p| p.signal.aspect == signal.aspect);
        if !same_signal {
            self.carried_speed = previous.map_or(self.config.maximum_speed, |p| p.current_speed.max(0.0));
        }
        let start = if explicit { self.block_start } else { location };
        let mut pattern = SignalPattern::new(signal, start, self.carried_speed);
        pattern.update(location, cab.speed(), &self.config, previous.as_ref());
        pattern
    }

    /// State supervision would pick with no stage timer.
    fn desired_state(&self, pattern: &SignalPattern, speed: f64) -> State {
        let overrun = pattern.signal.overrun_protector && speed > pattern.current_speed && speed >= STANDSTILL_SPEED;
        if pattern.current_speed < 0.0 || overrun {
            State::Emergency
        } else if speed < pattern.release_speed && pattern.current_speed > 0.0 {
            State::Normal
        } else if speed - pattern.current_speed > self.config.full_service_margin {
            State::ServiceFull
        } else {
            State::ServiceHalf
        }
    }

    fn stage(&mut self, desired: State, dt: f64, cab: &CabStatus) {
        if self.stage_countdown > 0.0 {
            self.stage_countdown = (self.stage_countdown - dt).max(0.0);
        }
        if desired == self.state {
            return;
        }
        if desired == State::Emergency {
            self.stage_countdown = 0.0;
            self.set_state(State::Emergency);
        } else if self.state == State::Emergency {
            if cab.is_stopped() {
                self.set_state(desired);
                self.stage_countdown = self.config.stage_duration;
            }
        } else if self.stage_countdown <= 0.0 {
            self.set_state(step_toward(self.state, desired));
            self.stage_countdown = self.config.stage_duration;
        }
    }

    fn service_half_notch(&self, cab: &CabStatus) -> u32 {
        let max_notch = cab.specs.brake_notches;
        if max_notch <= 1 || cab.specs.max_deceleration <= 0.0 {
            return max_notch;
        }
        let ratio = (self.config.regular.deceleration / cab.specs.max_deceleration).clamp(0.0, 1.0);
        let notch = 1.0 + (f64::from(max_notch - 1) * ratio).round();
        (notch as u32).clamp(1, max_notch)
    }

    /// Switch hint of the table entry for the current aspect.
    fn switch_hint(&self) -> Option<SwitchHint> {
        self.config.signal(self.aspect).and_then(|signal| signal.switch_hint)
    }

    fn check_switch(&mut self, cab: &CabStatus) {
        let wanted = match (self.state, self.switch_hint()) {
            (State::Ats, Some(SwitchHint::ToAtc)) => Some(SwitchHint::ToAtc),
            (state, Some(SwitchHint::ToAts)) if state.is_supervising() => Some(SwitchHint::ToAts),
            _ => None,
        };
        self.switch_pending = None;
        let Some(hint) = wanted else {
            return;
        };
        if !cab.is_stopped() {
            return;
        }
        if self.config.automatic_switch {
            self.switch(hint);
        } else {
            self.switch_pending = Some(hint);
        }
    }

    fn switch(&mut self, hint: SwitchHint) {
        match hint {
            SwitchHint::ToAtc => {
                self.stage_countdown = 0.0;
                self.set_state(State::Normal);
            }
            SwitchHint::ToAts => {
                self.pattern = None;
                self.set_state(State::Ats);
            }
        }
        self.switch_pending = None;
    }

    fn write_indicators(&self, tick: &mut Tick<'_>) {
        if self.state == State::Disabled {
            return;
        }
        tick.out.set_indicator(indicator::ATC_POWER, 1);
        if self.state == State::Ats {
            tick.out.set_indicator(indicator::ATC_ATS, 1);
        }
        if self.emergency_operation {
            tick.out.set_indicator(indicator::ATC_EMERGENCY_OPERATION, 1);
        }
        if !self.state.is_supervising() {
            return;
        }
        tick.out.set_indicator(indicator::ATC_ACTIVE, 1);
        if let Some(pattern) = &self.pattern {
            let lamp = match pattern.indicator {
                SignalIndicator::None => None,
                SignalIndicator::Green => Some(indicator::ATC_GREEN),
                SignalIndicator::Red => Some(indicator::ATC_RED),
                SignalIndicator::P => Some(indicator::ATC_P),
                SignalIndicator::X => Some(indicator::ATC_X),
            };
            if let Some(lamp) = lamp {
                tick.out.set_indicator(lamp, 1);
            }
            if pattern.current_speed >= 0.0 {
                tick.out.set_indicator(indicator::ATC_SPEED, (pattern.current_speed * 3.6).round() as i32);
            }
            if pattern.signal.advance_warning {
                tick.out.set_indicator(indicator::ATC_ADVANCE, 1);
            }
            tick.out.debug(&format!(
                "ATC {:?} aspect {} {:.0}km/h",
                self.state,
                pattern.signal.aspect,
                pattern.current_speed * 3.6
            ));
        }
        match self.state {
            State::ServiceHalf | State::ServiceFull => tick.out.set_indicator(indicator::ATC_SERVICE, 1),
            State::Emergency => tick.out.set_indicator(indicator::ATC_EMERGENCY, 1),
            _ => {}
        }
    }
}

/// Service stages move one step per timer period.
fn step_toward(current: State, desired: State) -> State {
    let rank = |state: State| match state {
        State::ServiceHalf => 1,
        State::ServiceFull => 2,
        _ => 0,
    };
    match rank(desired).cmp(&rank(current)) {
        core::cmp::Ordering::Greater if rank(current) == 0 => State::ServiceHalf,
        core::cmp::Ordering::Greater => State::ServiceFull,
        core::cmp::Ordering::Less if rank(current) == 2 => State::ServiceHalf,
        core::cmp::Ordering::Less => State::Normal,
        core::cmp::Ordering::Equal => desired,
    }
}

impl Device for Atc {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Atc
    }

    fn device_state(&self) -> DeviceState {
        DeviceState::Atc(self.state)
    }

    fn supervised_speed(&self) -> Option<f64> {
        if self.state.is_supervising() {
            self.pattern.map(|pattern| pattern.current_speed)
        } else {
            None
        }
    }

    fn initialize(&mut self, mode: InitializationMode, cab: &CabStatus) {
        self.pattern = None;
        self.stage_countdown = 0.0;
        self.switch_pending = None;
        self.emergency_operation = false;
        self.block_start = cab.location();
        let state = match mode {
            InitializationMode::OnService => self.initial_mode(),
            InitializationMode::OnEmergency => State::Suppressed,
            InitializationMode::OffEmergency => State::Disabled,
        };
        self.set_state(state);
        self.announced = self.state;
    }

    fn elapse(&mut self, tick: &mut Tick<'_>) {
        let dt = tick.elapsed;
        let cab = tick.cab;
        self.brake_notch = 0;
        self.limits.advance(cab.location());

        if self.state == State::Suppressed && cab.handles.brake >= cab.specs.emergency_notch() {
            let mode = self.initial_mode();
            self.set_state(mode);
        }

        if self.state.is_supervising() && !*tick.blocking {
            let pattern = self.build_pattern(cab);
            let previous_aspect = self.pattern.map(|p| p.signal.aspect);
            self.pattern = Some(pattern);

            let desired = self.desired_state(&pattern, cab.speed());
            self.stage(desired, dt, cab);

            self.brake_notch = match self.state {
                State::ServiceHalf => self.service_half_notch(cab),
                State::ServiceFull => cab.specs.brake_notches,
                State::Emergency => cab.specs.emergency_notch(),
                _ => 0,
            };
            if self.brake_notch > 0 {
                tick.handles.apply_brake(self.brake_notch);
            }
            if previous_aspect.is_some_and(|aspect| aspect != pattern.signal.aspect) {
                tick.out.play(Sound::AtcDing);
            }
            *tick.blocking = true;
        }

        self.check_switch(cab);
        if self.switch_pending.is_some() {
            tick.out.keep_playing(Sound::AtcSwitchReminder);
        }
        if self.state != self.announced {
            if self.state == State::Emergency {
                tick.out.play(Sound::AtcEmergency);
            } else if self.state.is_supervising() && !self.announced.is_supervising() {
                tick.out.play(Sound::AtcDing);
            }
            self.announced = self.state;
        }
        self.write_indicators(tick);
    }

    fn key_down(&mut self, key: Key, cab: &CabStatus) {
        match key {
            Key::C1 => {
                if let Some(hint) = self.switch_pending {
                    if cab.is_stopped() {
                        self.switch(hint);
                    }
                }
            }
            Key::C2 => {
                if self.state.is_supervising() && cab.is_stopped() {
                    self.emergency_operation = !self.emergency_operation;
                    debug!("ATC emergency operation {}", self.emergency_operation);
                }
            }
            _ => {}
        }
    }

    fn key_up(&mut self, _key: Key, _cab: &CabStatus) {}

    fn set_signal(&mut self, signals: &[SignalData], cab: &CabStatus) {
        let aspect = signals.first().map_or(NO_SIGNAL_ASPECT, |signal| signal.aspect);
        if aspect != self.aspect {
            self.aspect = aspect;
            self.block_start = cab.location();
        }
    }

    fn set_beacon(&mut self, beacon: &BeaconData, cab: &CabStatus) {
        if beacon.kind != BEACON_COMPATIBILITY {
            return;
        }
        match beacon.distance_and_speed() {
            Some((distance, speed)) => {
                let location = cab.location();
                self.limits.insert(
                    CompatibilityLimit {
                        speed,
                        position: location + distance,
                    },
                    location,
                );
            }
            None => debug!("ATC ignores compatibility payload {}", beacon.optional),
        }
    }

    fn door_change(&mut self, _old: DoorState, _new: DoorState, _cab: &CabStatus) {}

    fn horn_blow(&mut self, _horn: HornKind, _cab: &CabStatus) {}

    fn handle_change(&mut self, _change: HandleChange, _cab: &CabStatus) {}
}
