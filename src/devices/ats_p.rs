//! ATS-P: continuous pattern supervision with per-signal stop patterns.
//!
//! While engaged the device evaluates every pattern each tick, takes over
//! from ATS-Ps and ATS-Sx through the blocking flag, and brakes with the
//! approach controller toward the governing pattern's target.

use super::{Device, DeviceKind, DeviceState, InitializationMode, Tick};
use crate::approach::ApproachParameters;
use crate::cab::{BeaconData, CabStatus, DoorState, HandleChange, HornKind, Key, SignalData};
use crate::output::{indicator, Sound};
use crate::pattern::{CompatibilityLimit, CompatibilityLimits, CurveParameters, Pattern, SpeedLimit, TargetPosition};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BEACON_RENEWAL: i32 = 3;
pub const BEACON_IMMEDIATE_STOP: i32 = 4;
pub const BEACON_RENEWAL_ACTIVE: i32 = 5;
pub const BEACON_DIVERGENCE: i32 = 6;
pub const BEACON_ROUTE_PERMANENT: i32 = 7;
pub const BEACON_DOWNSLOPE: i32 = 8;
pub const BEACON_CURVE: i32 = 9;
pub const BEACON_TEMPORARY: i32 = 10;
pub const BEACON_COMPATIBILITY: i32 = 16;

pub const MAX_SIGNAL_PATTERNS: usize = 16;

/// Red-signal reports closer than this describe the same signal.
const SIGNAL_TOLERANCE: f64 = 5.0;
/// Signal patterns are dropped this far past their target.
const PASSED_SIGNAL_MARGIN: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Disabled,
    Suppressed,
    Initializing,
    Standby,
    Normal,
    Pattern,
    Brake,
    Service,
    Emergency,
    Released,
}

impl State {
    /// Engaged states block the devices after ATS-P.
    pub fn is_engaged(self) -> bool {
        matches!(
            self,
            State::Normal | State::Pattern | State::Brake | State::Service | State::Emergency
        )
    }
}

/// Which pattern governs the brake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    Signal(usize),
    Divergence,
    Downslope,
    Curve,
    Temporary,
    RoutePermanent,
    TrainPermanent,
    CompatibilityTemporary,
    CompatibilityPermanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtsPConfig {
    pub curve: CurveParameters,
    pub initialization_duration: f64,
    pub maximum_speed: Option<f64>,
}

impl Default for AtsPConfig {
    fn default() -> Self {
        Self {
            curve: CurveParameters::default(),
            initialization_duration: 3.0,
            maximum_speed: None,
        }
    }
}

#[derive(Debug, Clone)]
struct PatternSet {
    signals: Vec<Pattern, MAX_SIGNAL_PATTERNS>,
    divergence: Pattern,
    downslope: Pattern,
    curve: Pattern,
    temporary: Pattern,
    route_permanent: Pattern,
    train_permanent: Pattern,
    compatibility_temporary: Pattern,
    compatibility_permanent: Pattern,
}

impl PatternSet {
    fn new(maximum_speed: Option<f64>) -> Self {
        let train_permanent = match maximum_speed {
            Some(speed) => Pattern::persistent(SpeedLimit::Limit(speed)),
            None => Pattern::unlimited(),
        };
        Self {
            signals: Vec::new(),
            divergence: Pattern::unlimited(),
            downslope: Pattern::unlimited(),
            curve: Pattern::unlimited(),
            temporary: Pattern::unlimited(),
            route_permanent: Pattern::unlimited(),
            train_permanent,
            compatibility_temporary: Pattern::unlimited(),
            compatibility_permanent: Pattern::unlimited(),
        }
    }

    fn fixed(&self) -> [(PatternKind, &Pattern); 8] {
        [
            (PatternKind::Divergence, &self.divergence),
            (PatternKind::Downslope, &self.downslope),
            (PatternKind::Curve, &self.curve),
            (PatternKind::Temporary, &self.temporary),
            (PatternKind::RoutePermanent, &self.route_permanent),
            (PatternKind::TrainPermanent, &self.train_permanent),
            (PatternKind::CompatibilityTemporary, &self.compatibility_temporary),
            (PatternKind::CompatibilityPermanent, &self.compatibility_permanent),
        ]
    }

    fn iter(&self) -> impl Iterator<Item = (PatternKind, &Pattern)> {
        self.signals
            .iter()
            .enumerate()
            .map(|(index, pattern)| (PatternKind::Signal(index), pattern))
            .chain(self.fixed())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pattern> {
        self.signals.iter_mut().chain([
            &mut self.divergence,
            &mut self.downslope,
            &mut self.curve,
            &mut self.temporary,
            &mut self.route_permanent,
            &mut self.train_permanent,
            &mut self.compatibility_temporary,
            &mut self.compatibility_permanent,
        ])
    }

    fn get_mut(&mut self, kind: PatternKind) -> Option<&mut Pattern> {
        match kind {
            PatternKind::Signal(index) => self.signals.get_mut(index),
            PatternKind::Divergence => Some(&mut self.divergence),
            PatternKind::Downslope => Some(&mut self.downslope),
            PatternKind::Curve => Some(&mut self.curve),
            PatternKind::Temporary => Some(&mut self.temporary),
            PatternKind::RoutePermanent => Some(&mut self.route_permanent),
            PatternKind::TrainPermanent => Some(&mut self.train_permanent),
            PatternKind::CompatibilityTemporary => Some(&mut self.compatibility_temporary),
            PatternKind::CompatibilityPermanent => Some(&mut self.compatibility_permanent),
        }
    }

    /// Drops everything track-side; the persistent train limit survives.
    fn clear_track(&mut self) {
        self.signals.clear();
        for pattern in self.iter_mut() {
            pattern.clear();
        }
    }

    fn add_signal(&mut self, position: f64) {
        let exists = self.signals.iter().any(|pattern| match pattern.target() {
            TargetPosition::At(existing) => (existing - position).abs() <= SIGNAL_TOLERANCE,
            _ => false,
        });
        if exists {
            return;
        }
        if self.signals.is_full() {
            self.signals.remove(0);
        }
        let _ = self.signals.push(Pattern::at(position, 0.0));
    }

    fn remove_signal(&mut self, position: f64) {
        self.signals.retain(|pattern| match pattern.target() {
            TargetPosition::At(existing) => (existing - position).abs() > SIGNAL_TOLERANCE,
            _ => true,
        });
    }
}

#[derive(Debug, Clone)]
pub struct AtsP {
    config: AtsPConfig,
    state: State,
    patterns: PatternSet,
    limits: CompatibilityLimits,
    initialization_countdown: f64,
    governing: Option<PatternKind>,
    brake_notch: u32,
    blocked: bool,
    announced: State,
}

impl AtsP {
    pub fn new(config: AtsPConfig) -> Self {
        Self {
            config,
            state: State::Suppressed,
            patterns: PatternSet::new(config.maximum_speed),
            limits: CompatibilityLimits::new(config.curve.deceleration),
            initialization_countdown: 0.0,
            governing: None,
            brake_notch: 0,
            blocked: false,
            announced: State::Suppressed,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &AtsPConfig {
        &self.config
    }

    pub fn signal_patterns(&self) -> &[Pattern] {
        &self.patterns.signals
    }

    pub fn compatibility_limits(&self) -> &CompatibilityLimits {
        &self.limits
    }

    pub fn pattern(&self, kind: PatternKind) -> Option<&Pattern> {
        self.patterns
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, pattern)| pattern)
    }

    /// Pattern the brake is currently aimed at.
    pub fn governing_pattern(&self) -> Option<PatternKind> {
        self.governing
    }

    /// Notch ATS-P demanded on the last tick.
    pub fn brake_notch(&self) -> u32 {
        self.brake_notch
    }

    pub fn brake_speed(&self) -> f64 {
        self.patterns
            .iter()
            .filter(|(_, p)| p.is_active())
            .map(|(_, p)| p.brake_speed())
            .fold(f64::INFINITY, f64::min)
    }

    pub fn warning_speed(&self) -> f64 {
        self.patterns
            .iter()
            .filter(|(_, p)| p.is_active())
            .map(|(_, p)| p.warning_speed())
            .fold(f64::INFINITY, f64::min)
    }

    /// Replaces the persistent train limit.
    pub fn set_train_limit(&mut self, speed: SpeedLimit) {
        self.patterns.train_permanent.override_persistent(speed);
    }

    fn set_state(&mut self, next: State) {
        if self.state != next {
            debug!("ATS-P {:?} -> {:?}", self.state, next);
            if matches!(next, State::Standby | State::Disabled | State::Suppressed) {
                self.patterns.clear_track();
                self.limits.clear();
                self.governing = None;
            }
            self.state = next;
        }
    }

    fn engage(&mut self) {
        if self.state == State::Standby {
            self.set_state(State::Normal);
        }
    }

    fn accepts_beacons(&self) -> bool {
        !self.blocked && (self.state == State::Standby || self.state.is_engaged())
    }

    fn sync_compatibility(&mut self, location: f64) {
        self.limits.advance(location);
        match self.limits.upcoming() {
            Some(limit) => self
                .patterns
                .compatibility_temporary
                .set(TargetPosition::At(limit.position), SpeedLimit::Limit(limit.speed)),
            None => {
                self.patterns.compatibility_temporary.clear();
            }
        }
        match self.limits.current() {
            Some(limit) => self
                .patterns
                .compatibility_permanent
                .set(TargetPosition::Immediate, SpeedLimit::Limit(limit.speed)),
            None => {
                self.patterns.compatibility_permanent.clear();
            }
        }
    }

    fn update_patterns(&mut self, location: f64, speed: f64) {
        self.sync_compatibility(location);

        // Fixed-position limits stay in force once the train is past their start
        for pattern in [
            &mut self.patterns.divergence,
            &mut self.patterns.downslope,
            &mut self.patterns.curve,
            &mut self.patterns.temporary,
        ] {
            if let TargetPosition::At(position) = pattern.target() {
                if location >= position {
                    let speed = pattern.target_speed();
                    pattern.set(TargetPosition::Immediate, speed);
                }
            }
        }

        let curve = self.config.curve;
        for pattern in self.patterns.iter_mut() {
            pattern.update(location, &curve);
        }

        self.patterns.signals.retain(|pattern| match pattern.target() {
            TargetPosition::At(position) => {
                !(location > position + PASSED_SIGNAL_MARGIN && speed < pattern.brake_speed())
            }
            _ => true,
        });
    }

    /// Active pattern with the lowest brake speed at or below `speed`.
    ///
    /// A red signal the train has already passed stays exceeded until the
    /// train stands still, whatever the release speed allows.
    fn exceeded_pattern(&self, location: f64, speed: f64) -> Option<PatternKind> {
        self.patterns
            .iter()
            .filter(|(kind, p)| {
                let passed = matches!(kind, PatternKind::Signal(_))
                    && p.distance_from(location).map_or(false, |distance| distance <= 0.0);
                p.is_active() && (speed >= p.brake_speed() || (passed && speed > 0.0))
            })
            .min_by(|(_, a), (_, b)| a.brake_speed().total_cmp(&b.brake_speed()))
            .map(|(kind, _)| kind)
    }

    fn supervise(&mut self, location: f64, speed: f64) {
        match self.state {
            State::Normal | State::Pattern | State::Brake => {
                self.governing = self.exceeded_pattern(location, speed);
                if self.governing.is_some() {
                    self.set_state(State::Brake);
                } else if speed > self.warning_speed() {
                    self.set_state(State::Pattern);
                } else {
                    self.set_state(State::Normal);
                }
            }
            _ => {}
        }
    }

    /// Brake notch toward the governing pattern. Within one brake
    /// application the notch is never lowered.
    fn select_notch(&mut self, cab: &CabStatus, previous: u32) -> u32 {
        let max_notch = cab.specs.brake_notches;
        if cab.doors.is_open() {
            return max_notch;
        }
        let params = ApproachParameters {
            max_notch,
            max_deceleration: cab.specs.max_deceleration,
            nominal_deceleration: self.config.curve.deceleration,
        };
        let location = cab.location();
        let speed = cab.speed();
        let notch = match self.governing.and_then(|kind| self.patterns.get_mut(kind)) {
            Some(pattern) => {
                let distance = pattern.distance_from(location).unwrap_or(0.0);
                let target = pattern.target_speed().value();
                pattern.approach.notch(speed, target, distance, previous, &params)
            }
            None => max_notch,
        };
        notch.max(previous).max(1)
    }

    fn announce(&mut self, tick: &mut Tick<'_>) {
        if self.state == self.announced {
            return;
        }
        let was_braking = matches!(self.announced, State::Brake | State::Service | State::Emergency);
        match self.state {
            State::Brake | State::Service | State::Emergency if !was_braking => {
                tick.out.play(Sound::AtsPBrakeApply)
            }
            State::Normal | State::Pattern if was_braking => tick.out.play(Sound::AtsPBrakeRelease),
            State::Pattern => tick.out.play(Sound::AtsPDing),
            State::Normal if self.announced == State::Standby => tick.out.play(Sound::AtsPDing),
            _ => {}
        }
        self.announced = self.state;
    }
}

impl Device for AtsP {
    fn kind(&self) -> DeviceKind {
        DeviceKind::AtsP
    }

    fn device_state(&self) -> DeviceState {
        DeviceState::AtsP(self.state)
    }

    fn supervised_speed(&self) -> Option<f64> {
        if self.state.is_engaged() {
            Some(self.brake_speed()).filter(|speed| speed.is_finite())
        } else {
            None
        }
    }

    fn initialize(&mut self, mode: InitializationMode, _cab: &CabStatus) {
        self.initialization_countdown = 0.0;
        self.brake_notch = 0;
        let state = match mode {
            InitializationMode::OnService => State::Standby,
            InitializationMode::OnEmergency => State::Suppressed,
            InitializationMode::OffEmergency => State::Disabled,
        };
        self.set_state(state);
        self.patterns.clear_track();
        self.limits.clear();
        self.announced = self.state;
    }

    fn elapse(&mut self, tick: &mut Tick<'_>) {
        let dt = tick.elapsed;
        let cab = tick.cab;
        let location = cab.location();
        let speed = cab.speed();

        match self.state {
            State::Suppressed => {
                if cab.handles.brake >= cab.specs.emergency_notch() {
                    self.initialization_countdown = self.config.initialization_duration;
                    self.set_state(State::Initializing);
                }
            }
            State::Initializing => {
                self.initialization_countdown -= dt;
                if self.initialization_countdown <= 0.0 {
                    self.set_state(State::Standby);
                }
            }
            _ => {}
        }

        self.blocked = *tick.blocking;
        let previous_notch = if self.state == State::Brake { self.brake_notch } else { 0 };
        self.brake_notch = 0;
        if self.blocked {
            if self.state.is_engaged() {
                self.set_state(State::Standby);
            }
        } else if self.state.is_engaged() {
            self.update_patterns(location, speed);
            self.supervise(location, speed);
            match self.state {
                State::Brake => {
                    self.brake_notch = self.select_notch(cab, previous_notch);
                }
                State::Service => self.brake_notch = cab.specs.brake_notches,
                State::Emergency => self.brake_notch = cab.specs.emergency_notch(),
                _ => {}
            }
            if self.brake_notch > 0 {
                tick.handles.apply_brake(self.brake_notch);
            }
            *tick.blocking = true;
        }

        self.announce(tick);
        if !matches!(self.state, State::Disabled | State::Suppressed) {
            tick.out.set_indicator(indicator::P_POWER, 1);
        }
        if self.state.is_engaged() {
            tick.out.set_indicator(indicator::P_ACTIVE, 1);
            tick.out.debug(&format!(
                "P {:?} {:.0}km/h notch {}",
                self.state,
                self.brake_speed() * 3.6,
                self.brake_notch
            ));
        }
        if matches!(self.state, State::Pattern | State::Brake) {
            tick.out.set_indicator(indicator::P_PATTERN, 1);
        }
        if matches!(self.state, State::Brake | State::Service | State::Emergency) {
            tick.out.set_indicator(indicator::P_BRAKE, 1);
        }
        if self.state == State::Released {
            tick.out.set_indicator(indicator::P_RELEASE, 1);
        }
    }

    fn key_down(&mut self, key: Key, cab: &CabStatus) {
        match key {
            Key::B1 => {
                if matches!(self.state, State::Service | State::Emergency) && cab.is_stopped() {
                    self.set_state(State::Normal);
                }
            }
            Key::B2 => {
                if self.state.is_engaged() {
                    self.set_state(State::Released);
                } else if self.state == State::Released {
                    self.set_state(State::Standby);
                }
            }
            Key::D => {
                if self.state == State::Disabled {
                    self.set_state(State::Suppressed);
                } else {
                    self.set_state(State::Disabled);
                }
            }
            _ => {}
        }
    }

    fn key_up(&mut self, _key: Key, _cab: &CabStatus) {}

    fn set_signal(&mut self, _signals: &[SignalData], _cab: &CabStatus) {}

    fn set_beacon(&mut self, beacon: &BeaconData, cab: &CabStatus) {
        if !self.accepts_beacons() {
            return;
        }
        let location = cab.location();
        match beacon.kind {
            BEACON_RENEWAL | BEACON_RENEWAL_ACTIVE => {
                if beacon.kind == BEACON_RENEWAL {
                    self.engage();
                } else if !self.state.is_engaged() {
                    return;
                }
                let position = location + beacon.signal_distance;
                if beacon.signal_is_red() {
                    self.patterns.add_signal(position);
                } else {
                    self.patterns.remove_signal(position);
                }
            }
            BEACON_IMMEDIATE_STOP => {
                if beacon.signal_is_red() {
                    self.engage();
                    self.patterns.add_signal(location + beacon.signal_distance);
                    if beacon.signal_distance <= 0.0 {
                        self.set_state(State::Emergency);
                    } else {
                        self.set_state(State::Service);
                    }
                }
            }
            BEACON_DIVERGENCE | BEACON_DOWNSLOPE | BEACON_CURVE | BEACON_TEMPORARY => {
                self.engage();
                let pattern = match beacon.kind {
                    BEACON_DIVERGENCE => &mut self.patterns.divergence,
                    BEACON_DOWNSLOPE => &mut self.patterns.downslope,
                    BEACON_CURVE => &mut self.patterns.curve,
                    _ => &mut self.patterns.temporary,
                };
                match beacon.distance_and_speed() {
                    Some((distance, speed)) => {
                        pattern.set(TargetPosition::At(location + distance), SpeedLimit::Limit(speed))
                    }
                    None => {
                        pattern.clear();
                    }
                }
            }
            BEACON_ROUTE_PERMANENT => {
                self.engage();
                if beacon.optional > 0 {
                    let speed = f64::from(beacon.optional) / 3.6;
                    self.patterns
                        .route_permanent
                        .set(TargetPosition::Immediate, SpeedLimit::Limit(speed));
                } else {
                    self.patterns.route_permanent.clear();
                }
            }
            BEACON_COMPATIBILITY => {
                if let Some((distance, speed)) = beacon.distance_and_speed() {
                    self.engage();
                    self.limits.insert(
                        CompatibilityLimit {
                            speed,
                            position: location + distance,
                        },
                        location,
                    );
                } else {
                    debug!("ATS-P ignores compatibility payload {}", beacon.optional);
                }
            }
            _ => {}
        }
    }

    fn door_change(&mut self, _old: DoorState, _new: DoorState, _cab: &CabStatus) {}

    fn horn_blow(&mut self, _horn: HornKind, _cab: &CabStatus) {}

    fn handle_change(&mut self, _change: HandleChange, _cab: &CabStatus) {}
}
