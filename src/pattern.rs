//! Brake-curve engine shared by the pattern-based devices.
//!
//! A pattern is a target speed at a target position. Every tick it is turned
//! into a warning envelope and a brake envelope: the highest speed the train
//! may have at its current location and still reach the target speed at the
//! target position, allowing for a reaction delay before braking starts.

use crate::approach::Approach;
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Target speeds at or below this skip the tolerances for immediate patterns.
pub const NEAR_ZERO_SPEED: f64 = 1.0 / 3.6;

pub const MAX_COMPATIBILITY_LIMITS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetPosition {
    /// No target known; the pattern does not constrain.
    Unknown,
    /// The target speed applies wherever the train is.
    Immediate,
    At(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpeedLimit {
    Unlimited,
    Limit(f64),
}

impl SpeedLimit {
    /// Limit as a number, `+inf` when unlimited.
    pub fn value(self) -> f64 {
        match self {
            SpeedLimit::Unlimited => f64::INFINITY,
            SpeedLimit::Limit(speed) => speed,
        }
    }

    pub fn is_limited(self) -> bool {
        matches!(self, SpeedLimit::Limit(_))
    }

    pub fn min(self, other: SpeedLimit) -> SpeedLimit {
        match (self, other) {
            (SpeedLimit::Unlimited, other) => other,
            (this, SpeedLimit::Unlimited) => this,
            (SpeedLimit::Limit(a), SpeedLimit::Limit(b)) => SpeedLimit::Limit(a.min(b)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveParameters {
    pub deceleration: f64,
    pub brake_delay: f64,
    pub brake_offset: f64,
    pub brake_tolerance: f64,
    pub warning_delay: f64,
    pub warning_offset: f64,
    pub warning_tolerance: f64,
    pub release_speed: f64,
}

impl Default for CurveParameters {
    fn default() -> Self {
        Self {
            deceleration: 2.445 / 3.6,
            brake_delay: 0.5,
            brake_offset: 0.0,
            brake_tolerance: 0.0,
            warning_delay: 5.5,
            warning_offset: 50.0,
            warning_tolerance: -5.0 / 3.6,
            release_speed: 15.0 / 3.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub warning: SpeedLimit,
    pub brake: SpeedLimit,
}

impl Envelope {
    pub const UNLIMITED: Envelope = Envelope {
        warning: SpeedLimit::Unlimited,
        brake: SpeedLimit::Unlimited,
    };
}

/// Speed from which a train braking at `deceleration` after `delay` seconds
/// reaches `target_speed` in `distance - offset` metres.
pub fn curve_speed(distance: f64, target_speed: f64, deceleration: f64, delay: f64, offset: f64) -> f64 {
    let radicand = 2.0 * deceleration * (distance - offset)
        + deceleration * deceleration * delay * delay
        + target_speed * target_speed;
    radicand.max(0.0).sqrt() - deceleration * delay
}

pub fn evaluate(target: TargetPosition, speed: SpeedLimit, location: f64, params: &CurveParameters) -> Envelope {
    let target_speed = match speed {
        SpeedLimit::Unlimited => return Envelope::UNLIMITED,
        SpeedLimit::Limit(speed) => speed,
    };
    match target {
        TargetPosition::Unknown => Envelope::UNLIMITED,
        TargetPosition::Immediate => {
            let (warning, brake) = if target_speed > NEAR_ZERO_SPEED {
                (
                    target_speed + params.warning_tolerance,
                    target_speed + params.brake_tolerance,
                )
            } else {
                (target_speed, target_speed)
            };
            Envelope {
                warning: SpeedLimit::Limit(warning),
                brake: SpeedLimit::Limit(brake.max(params.release_speed)),
            }
        }
        TargetPosition::At(position) => {
            let distance = position - location;
            let warning = curve_speed(
                distance,
                target_speed,
                params.deceleration,
                params.warning_delay,
                params.warning_offset,
            )
            .max(target_speed + params.warning_tolerance);
            let brake = curve_speed(
                distance,
                target_speed,
                params.deceleration,
                params.brake_delay,
                params.brake_offset,
            )
            .max(target_speed + params.brake_tolerance)
            .max(params.release_speed);
            Envelope {
                warning: SpeedLimit::Limit(warning),
                brake: SpeedLimit::Limit(brake),
            }
        }
    }
}

/// One speed/distance constraint with its last computed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    target: TargetPosition,
    speed: SpeedLimit,
    persistent: bool,
    envelope: Envelope,
    pub approach: Approach,
}

impl Pattern {
    pub const fn unlimited() -> Self {
        Self {
            target: TargetPosition::Unknown,
            speed: SpeedLimit::Unlimited,
            persistent: false,
            envelope: Envelope::UNLIMITED,
            approach: Approach::new(),
        }
    }

    /// A limit that track events cannot clear.
    pub fn persistent(speed: SpeedLimit) -> Self {
        Self {
            target: TargetPosition::Immediate,
            speed,
            persistent: true,
            envelope: Envelope::UNLIMITED,
            approach: Approach::new(),
        }
    }

    pub fn at(position: f64, speed: f64) -> Self {
        let mut pattern = Self::unlimited();
        pattern.set(TargetPosition::At(position), SpeedLimit::Limit(speed));
        pattern
    }

    /// Re-delivering the same constraint keeps the approach state.
    pub fn set(&mut self, target: TargetPosition, speed: SpeedLimit) {
        if self.persistent {
            return;
        }
        if self.target != target || self.speed != speed {
            self.target = target;
            self.speed = speed;
            self.approach.reset();
        }
    }

    /// Track-side release; returns false for persistent patterns.
    pub fn clear(&mut self) -> bool {
        if self.persistent {
            return false;
        }
        self.target = TargetPosition::Unknown;
        self.speed = SpeedLimit::Unlimited;
        self.envelope = Envelope::UNLIMITED;
        self.approach.reset();
        true
    }

    /// Train-specific override, the only way to change a persistent limit.
    pub fn override_persistent(&mut self, speed: SpeedLimit) {
        self.persistent = true;
        self.target = TargetPosition::Immediate;
        self.speed = speed;
        self.approach.reset();
    }

    pub fn update(&mut self, location: f64, params: &CurveParameters) -> Envelope {
        self.envelope = evaluate(self.target, self.speed, location, params);
        self.envelope
    }

    pub fn is_active(&self) -> bool {
        self.speed.is_limited() && self.target != TargetPosition::Unknown
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn target(&self) -> TargetPosition {
        self.target
    }

    pub fn target_speed(&self) -> SpeedLimit {
        self.speed
    }

    pub fn envelope(&self) -> Envelope {
        self.envelope
    }

    pub fn warning_speed(&self) -> f64 {
        self.envelope.warning.value()
    }

    pub fn brake_speed(&self) -> f64 {
        self.envelope.brake.value()
    }

    /// Remaining distance to the target point; zero for immediate patterns.
    pub fn distance_from(&self, location: f64) -> Option<f64> {
        match self.target {
            TargetPosition::Unknown => None,
            TargetPosition::Immediate => Some(0.0),
            TargetPosition::At(position) => Some(position - location),
        }
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityLimit {
    pub speed: f64,
    pub position: f64,
}

/// Position-ordered legacy speed limits with a cursor at the first limit
/// still ahead of the train.
#[derive(Debug, Clone)]
pub struct CompatibilityLimits {
    limits: Vec<CompatibilityLimit, MAX_COMPATIBILITY_LIMITS>,
    pointer: usize,
    deceleration: f64,
}

impl CompatibilityLimits {
    pub fn new(deceleration: f64) -> Self {
        Self {
            limits: Vec::new(),
            pointer: 0,
            deceleration,
        }
    }

    pub fn insert(&mut self, limit: CompatibilityLimit, location: f64) {
        // Same point re-delivered: replace
        if let Some(existing) = self
            .limits
            .iter_mut()
            .find(|l| (l.position - limit.position).abs() < 1.0)
        {
            *existing = limit;
        } else {
            if self.limits.is_full() {
                self.limits.remove(0);
            }
            let _ = self.limits.push(limit);
        }
        self.limits.sort_by(|a, b| a.position.total_cmp(&b.position));
        self.prune();
        self.pointer = self.pointer.min(self.limits.len());
        self.advance(location);
    }

    /// Drops every limit the train could never need to brake for because
    /// the curve toward the next limit is already at or below it.
    pub fn prune(&mut self) {
        let mut index = 0;
        while index + 1 < self.limits.len() {
            let here = self.limits[index];
            let next = self.limits[index + 1];
            let reachable = (next.speed * next.speed
                + 2.0 * self.deceleration * (next.position - here.position))
                .max(0.0)
                .sqrt();
            if reachable <= here.speed {
                self.limits.remove(index);
                index = index.saturating_sub(1);
            } else {
                index += 1;
            }
        }
    }

    /// Moves the cursor forward past limits behind the train, or back after
    /// a jump to an earlier position.
    pub fn advance(&mut self, location: f64) {
        while self.pointer < self.limits.len() && self.limits[self.pointer].position <= location {
            self.pointer += 1;
        }
        while self.pointer > 0 && self.limits[self.pointer - 1].position > location {
            self.pointer -= 1;
        }
    }

    pub fn upcoming(&self) -> Option<CompatibilityLimit> {
        self.limits.get(self.pointer).copied()
    }

    pub fn current(&self) -> Option<CompatibilityLimit> {
        self.pointer
            .checked_sub(1)
            .and_then(|index| self.limits.get(index))
            .copied()
    }

    pub fn limits(&self) -> &[CompatibilityLimit] {
        &self.limits
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn clear(&mut self) {
        self.limits.clear();
        self.pointer = 0;
    }
}
