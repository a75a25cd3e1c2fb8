use crate::pattern::curve_speed;
use serde::{Deserialize, Serialize};

use super::AtcConfig;

/// Final speed that demands an emergency stop.
pub const STOP_SPEED: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalIndicator {
    None,
    Green,
    Red,
    P,
    X,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InitialSpeed {
    /// Keep whatever the previous signal enforced.
    CarryOver,
    Speed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BlockDistance {
    Immediate,
    Unknown,
    Meters(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchHint {
    ToAts,
    ToAtc,
}

/// Decoded track-side signal aspect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub aspect: i32,
    pub indicator: SignalIndicator,
    pub initial: InitialSpeed,
    pub final_speed: f64,
    pub distance: BlockDistance,
    pub switch_hint: Option<SwitchHint>,
    pub advance_warning: bool,
    pub overrun_protector: bool,
}

impl Signal {
    /// Constant limit applying at once.
    pub fn fixed(aspect: i32, indicator: SignalIndicator, speed: f64) -> Self {
        Self {
            aspect,
            indicator,
            initial: InitialSpeed::Speed(speed),
            final_speed: speed,
            distance: BlockDistance::Immediate,
            switch_hint: None,
            advance_warning: false,
            overrun_protector: false,
        }
    }

    /// Limit decreasing from `initial` to `final_speed` over `distance` metres.
    pub fn braking(aspect: i32, indicator: SignalIndicator, initial: InitialSpeed, final_speed: f64, distance: f64) -> Self {
        Self {
            aspect,
            indicator,
            initial,
            final_speed,
            distance: BlockDistance::Meters(distance),
            switch_hint: None,
            advance_warning: false,
            overrun_protector: false,
        }
    }

    pub fn with_hint(mut self, hint: SwitchHint) -> Self {
        self.switch_hint = Some(hint);
        self
    }

    pub fn with_overrun_protector(mut self) -> Self {
        self.overrun_protector = true;
        self
    }

    pub fn with_advance_warning(mut self) -> Self {
        self.advance_warning = true;
        self
    }
}

/// Table used when the configuration names no signals.
pub fn default_signals() -> Vec<Signal> {
    let kmh = |speed: f64| speed / 3.6;
    vec![
        Signal::fixed(0, SignalIndicator::X, STOP_SPEED),
        Signal::fixed(1, SignalIndicator::Red, 0.0),
        Signal::fixed(2, SignalIndicator::Green, kmh(25.0)),
        Signal::fixed(3, SignalIndicator::Green, kmh(45.0)),
        Signal::fixed(4, SignalIndicator::Green, kmh(65.0)),
        Signal::fixed(5, SignalIndicator::Green, kmh(75.0)),
        Signal::fixed(6, SignalIndicator::Green, kmh(90.0)),
        Signal::fixed(7, SignalIndicator::Green, kmh(110.0)),
        Signal::braking(8, SignalIndicator::Green, InitialSpeed::CarryOver, 0.0, 200.0),
        Signal::braking(9, SignalIndicator::P, InitialSpeed::CarryOver, 0.0, 150.0).with_overrun_protector(),
    ]
}

/// Braking parameters picked for one pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrakeProfile {
    pub deceleration: f64,
    pub delay: f64,
    pub offset: f64,
}

impl BrakeProfile {
    /// Distance needed to brake from `speed` down to `target_speed`.
    pub fn braking_distance(&self, speed: f64, target_speed: f64) -> f64 {
        let lead = speed + self.deceleration * self.delay;
        let delay_term = self.deceleration * self.delay;
        (lead * lead - delay_term * delay_term - target_speed * target_speed) / (2.0 * self.deceleration)
            + self.offset
    }
}

/// A signal together with the speeds it enforces at the train's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalPattern {
    pub signal: Signal,
    /// Where the block governed by `signal` began.
    pub start: f64,
    pub initial_speed: f64,
    pub top_speed: f64,
    pub current_speed: f64,
    pub release_speed: f64,
    pub indicator: SignalIndicator,
}

impl SignalPattern {
    pub fn new(signal: Signal, start: f64, carried_speed: f64) -> Self {
        let initial_speed = match signal.initial {
            InitialSpeed::CarryOver => carried_speed,
            InitialSpeed::Speed(speed) => speed,
        };
        Self {
            signal,
            start,
            initial_speed,
            top_speed: initial_speed,
            current_speed: initial_speed,
            release_speed: initial_speed,
            indicator: signal.indicator,
        }
    }

    pub fn target_position(&self) -> Option<f64> {
        match self.signal.distance {
            BlockDistance::Meters(distance) => Some(self.start + distance),
            BlockDistance::Immediate | BlockDistance::Unknown => None,
        }
    }

    /// Recomputes the enforced speeds. `previous` is last tick's pattern and
    /// only lends its top speed when it belongs to the same signal.
    pub fn update(&mut self, location: f64, speed: f64, config: &AtcConfig, previous: Option<&SignalPattern>) {
        let signal = self.signal;
        let profile = if signal.overrun_protector {
            config.overrun
        } else {
            config.regular
        };
        let initial = self.initial_speed;
        let final_speed = signal.final_speed;
        self.indicator = signal.indicator;

        let (current, top) = match signal.distance {
            BlockDistance::Immediate => (final_speed, final_speed),
            BlockDistance::Unknown => (initial, initial),
            BlockDistance::Meters(distance) => {
                let remaining = self.start + distance - location;
                if final_speed >= initial {
                    if remaining > 0.0 {
                        (initial, initial)
                    } else {
                        (final_speed, final_speed)
                    }
                } else if remaining <= 0.0 {
                    (final_speed, final_speed)
                } else {
                    self.smoothed(remaining, speed.abs(), profile, config, previous)
                }
            }
        };

        let mut current = current;
        if signal.overrun_protector && final_speed >= 0.0 {
            if let Some(target) = self.target_position() {
                if location < target {
                    current = current.max(config.orp_release_speed);
                }
            }
        }
        self.current_speed = current;
        self.top_speed = top.max(current);
        self.release_speed = current - config.release_margin;
    }

    fn smoothed(
        &mut self,
        remaining: f64,
        speed: f64,
        profile: BrakeProfile,
        config: &AtcConfig,
        previous: Option<&SignalPattern>,
    ) -> (f64, f64) {
        let initial = self.initial_speed;
        let floor = self.signal.final_speed.max(0.0);
        let curve = curve_speed(remaining, floor, profile.deceleration, profile.delay, profile.offset)
            .max(floor)
            .min(initial.max(floor));

        let to_brake_point = remaining - profile.braking_distance(speed, floor);
        let time_to_brake = if speed > 0.1 {
            to_brake_point / speed
        } else {
            f64::INFINITY
        };
        let previous_top = previous
            .filter(|p| p.signal.aspect == self.signal.aspect)
            .map(|p| p.top_speed);

        if time_to_brake > config.long_threshold {
            // Peak speed reachable by accelerating then braking onto the curve
            let a = config.acceleration;
            let d = profile.deceleration;
            let squared = (2.0 * a * d * remaining + d * speed * speed + a * floor * floor) / (a + d);
            let fixed = squared.max(0.0).sqrt().min(initial).max(floor);
            (fixed, fixed)
        } else if time_to_brake > config.medium_threshold {
            let ceiling = previous_top.unwrap_or(initial).min(initial);
            (curve.min(ceiling), ceiling)
        } else {
            if self.signal.final_speed <= 0.0 && speed <= floor + config.final_approach_margin {
                self.indicator = SignalIndicator::Red;
            }
            (curve, curve)
        }
    }
}
