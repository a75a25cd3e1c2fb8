//! Parser for ATC aspect codes.
//!
//! ```text
//! [indicator ':'] initial ['/' final] ['@' distance] {',' flag}
//! ```
//!
//! Speeds are km/h, `*` (initial only) carries the previous speed over and
//! `stop` demands an emergency stop. Distances are metres, `now` or `?`.

use crate::devices::atc::{BlockDistance, InitialSpeed, Signal, SignalIndicator, SwitchHint, STOP_SPEED};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AspectError {
    #[error("empty aspect code")]
    Empty,
    #[error("unknown indicator `{0}`")]
    UnknownIndicator(String),
    #[error("invalid speed `{0}`")]
    InvalidSpeed(String),
    #[error("invalid distance `{0}`")]
    InvalidDistance(String),
    #[error("unknown flag `{0}`")]
    UnknownFlag(String),
    #[error("a carried-over initial speed needs a final speed")]
    CarryWithoutFinal,
    #[error("both `ats` and `atc` given")]
    ConflictingHints,
}

pub fn parse_signal(aspect: i32, code: &str) -> Result<Signal, AspectError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AspectError::Empty);
    }
    let mut parts = code.split(',');
    let head = parts.next().unwrap_or_default().trim();

    let (indicator, body) = match head.split_once(':') {
        Some((indicator, body)) => (parse_indicator(indicator)?, body.trim()),
        None => (SignalIndicator::None, head),
    };
    let (speeds, distance) = match body.split_once('@') {
        Some((speeds, distance)) => (speeds.trim(), Some(distance.trim())),
        None => (body, None),
    };
    let (initial, final_speed) = match speeds.split_once('/') {
        Some((initial, final_speed)) => (initial.trim(), Some(final_speed.trim())),
        None => (speeds, None),
    };

    let initial = if initial == "*" {
        InitialSpeed::CarryOver
    } else {
        InitialSpeed::Speed(parse_speed(initial)?)
    };
    let final_speed = match (final_speed, initial) {
        (Some(text), _) => parse_speed(text)?,
        (None, InitialSpeed::Speed(speed)) => speed,
        (None, InitialSpeed::CarryOver) => return Err(AspectError::CarryWithoutFinal),
    };
    let distance = match distance {
        None => BlockDistance::Immediate,
        Some(text) => parse_distance(text)?,
    };

    let mut signal = Signal {
        aspect,
        indicator,
        initial,
        final_speed,
        distance,
        switch_hint: None,
        advance_warning: false,
        overrun_protector: false,
    };
    for flag in parts {
        let flag = flag.trim();
        let hint = match flag.to_ascii_lowercase().as_str() {
            "ats" => Some(SwitchHint::ToAts),
            "atc" => Some(SwitchHint::ToAtc),
            "advance" => {
                signal.advance_warning = true;
                None
            }
            "orp" => {
                signal.overrun_protector = true;
                None
            }
            _ => return Err(AspectError::UnknownFlag(flag.to_string())),
        };
        if let Some(hint) = hint {
            if signal.switch_hint.is_some_and(|existing| existing != hint) {
                return Err(AspectError::ConflictingHints);
            }
            signal.switch_hint = Some(hint);
        }
    }
    Ok(signal)
}

fn parse_indicator(text: &str) -> Result<SignalIndicator, AspectError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(SignalIndicator::None),
        "green" => Ok(SignalIndicator::Green),
        "red" => Ok(SignalIndicator::Red),
        "p" => Ok(SignalIndicator::P),
        "x" => Ok(SignalIndicator::X),
        _ => Err(AspectError::UnknownIndicator(text.trim().to_string())),
    }
}

/// Speed in m/s from km/h text.
fn parse_speed(text: &str) -> Result<f64, AspectError> {
    if text.eq_ignore_ascii_case("stop") {
        return Ok(STOP_SPEED);
    }
    match text.parse::<f64>() {
        Ok(speed) if speed.is_finite() && speed >= 0.0 => Ok(speed / 3.6),
        _ => Err(AspectError::InvalidSpeed(text.to_string())),
    }
}

fn parse_distance(text: &str) -> Result<BlockDistance, AspectError> {
    if text.eq_ignore_ascii_case("now") {
        return Ok(BlockDistance::Immediate);
    }
    if text == "?" {
        return Ok(BlockDistance::Unknown);
    }
    match text.parse::<f64>() {
        Ok(distance) if distance.is_finite() && distance >= 0.0 => Ok(BlockDistance::Meters(distance)),
        _ => Err(AspectError::InvalidDistance(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_plain_speed() {
        let signal = parse_signal(3, "45").unwrap();
        assert_eq!(signal.aspect, 3);
        assert_eq!(signal.indicator, SignalIndicator::None);
        assert_eq!(signal.initial, InitialSpeed::Speed(45.0 / 3.6));
        assert!(close(signal.final_speed, 45.0 / 3.6));
        assert_eq!(signal.distance, BlockDistance::Immediate);
    }

    #[test]
    fn test_full_code() {
        let signal = parse_signal(8, "Green: 75/0 @ 200, advance, orp").unwrap();
        assert_eq!(signal.indicator, SignalIndicator::Green);
        assert_eq!(signal.initial, InitialSpeed::Speed(75.0 / 3.6));
        assert!(close(signal.final_speed, 0.0));
        assert_eq!(signal.distance, BlockDistance::Meters(200.0));
        assert!(signal.advance_warning);
        assert!(signal.overrun_protector);
        assert_eq!(signal.switch_hint, None);
    }

    #[test]
    fn test_carry_over_and_stop() {
        let signal = parse_signal(9, "x:*/stop@?,ats").unwrap();
        assert_eq!(signal.indicator, SignalIndicator::X);
        assert_eq!(signal.initial, InitialSpeed::CarryOver);
        assert!(close(signal.final_speed, STOP_SPEED));
        assert_eq!(signal.distance, BlockDistance::Unknown);
        assert_eq!(signal.switch_hint, Some(SwitchHint::ToAts));

        let signal = parse_signal(1, "red:0@now").unwrap();
        assert_eq!(signal.distance, BlockDistance::Immediate);
    }

    #[test]
    fn test_rejects_malformed_codes() {
        assert_eq!(parse_signal(0, "  "), Err(AspectError::Empty));
        assert_eq!(
            parse_signal(0, "amber:45"),
            Err(AspectError::UnknownIndicator("amber".to_string()))
        );
        assert_eq!(parse_signal(0, "fast"), Err(AspectError::InvalidSpeed("fast".to_string())));
        assert_eq!(parse_signal(0, "*"), Err(AspectError::CarryWithoutFinal));
        assert_eq!(parse_signal(0, "45/*"), Err(AspectError::InvalidSpeed("*".to_string())));
        assert_eq!(
            parse_signal(0, "45/0@far"),
            Err(AspectError::InvalidDistance("far".to_string()))
        );
        assert_eq!(
            parse_signal(0, "45,blink"),
            Err(AspectError::UnknownFlag("blink".to_string()))
        );
        assert_eq!(parse_signal(0, "45,ats,atc"), Err(AspectError::ConflictingHints));
    }
}
