//! Closed-loop brake notch selection toward a target speed at a target point.
//!
//! Used by ATS-P while it is actively braking and by TASC for precision stops.

use serde::{Deserialize, Serialize};

/// Gain applied to the deviation from nominal deceleration before the
/// approach is confirmed.
pub const AMPLIFICATION: f64 = 5.0;

const RAISE_BIAS: f64 = 0.75;
const LOWER_BIAS: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproachParameters {
    pub max_notch: u32,
    /// Deceleration produced at `max_notch`, m/s².
    pub max_deceleration: f64,
    /// Deceleration the stop is planned around, m/s².
    pub nominal_deceleration: f64,
}

/// Per-target controller state.
///
/// `confirmed` latches once the amplified notch catches up with the plain
/// one; it only clears through [`Approach::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Approach {
    confirmed: bool,
}

impl Approach {
    pub const fn new() -> Self {
        Self { confirmed: false }
    }

    pub fn reset(&mut self) {
        self.confirmed = false;
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Deceleration needed to go from `speed` to `target_speed` in `distance`.
    pub fn required_deceleration(speed: f64, target_speed: f64, distance: f64) -> f64 {
        let v = speed.abs();
        let vt = target_speed.max(0.0);
        if v <= vt {
            return 0.0;
        }
        (v * v - vt * vt) / (2.0 * distance)
    }

    /// Continuous notch value before rounding, updating the approach latch.
    pub fn notch_value(
        &mut self,
        speed: f64,
        target_speed: f64,
        distance: f64,
        params: &ApproachParameters,
    ) -> f64 {
        let max_notch = f64::from(params.max_notch);
        if distance <= 0.0 {
            return max_notch;
        }
        if params.max_deceleration <= 0.0 {
            return max_notch;
        }
        let required = Self::required_deceleration(speed, target_speed, distance);
        let plain = required / params.max_deceleration * max_notch;
        if self.confirmed {
            return plain;
        }
        let amplified_deceleration = params.nominal_deceleration
            + AMPLIFICATION * (required - params.nominal_deceleration);
        let amplified = amplified_deceleration / params.max_deceleration * max_notch;
        if amplified >= plain {
            self.confirmed = true;
            plain
        } else {
            amplified
        }
    }

    /// Notch to command this tick given the notch commanded last tick.
    pub fn notch(
        &mut self,
        speed: f64,
        target_speed: f64,
        distance: f64,
        previous_notch: u32,
        params: &ApproachParameters,
    ) -> u32 {
        let value = self.notch_value(speed, target_speed, distance, params);
        round_notch(value, previous_notch, params.max_notch)
    }

    /// Notch that stays at or below the demand and is only ever raised.
    ///
    /// Braking slightly less than required makes the required deceleration
    /// grow, so the demand climbs toward the stop and the notch follows it
    /// up without overshooting the point.
    pub fn trailing_notch(
        &mut self,
        speed: f64,
        target_speed: f64,
        distance: f64,
        previous_notch: u32,
        params: &ApproachParameters,
    ) -> u32 {
        let value = self.notch_value(speed, target_speed, distance, params);
        let notch = if value.is_finite() {
            clamp_notch(value.floor(), params.max_notch)
        } else {
            params.max_notch
        };
        notch.max(previous_notch.min(params.max_notch))
    }
}

/// Rounds toward braking early with a dead band around the previous notch.
///
/// Raising targets `floor(x + 0.75)` and lowering targets `floor(x + 0.25)`.
/// The previous notch is held while it lies between the two.
pub fn round_notch(value: f64, previous_notch: u32, max_notch: u32) -> u32 {
    if !value.is_finite() {
        return max_notch;
    }
    let raised = (value + RAISE_BIAS).floor();
    let lowered = (value + LOWER_BIAS).floor();
    let previous = f64::from(previous_notch);
    let rounded = if lowered > previous {
        raised
    } else if raised < previous {
        lowered
    } else {
        previous
    };
    clamp_notch(rounded, max_notch)
}

fn clamp_notch(rounded: f64, max_notch: u32) -> u32 {
    if rounded <= 0.0 {
        0
    } else if rounded >= f64::from(max_notch) {
        max_notch
    } else {
        rounded as u32
    }
}
