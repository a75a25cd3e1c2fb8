//! Train configuration file.
//!
//! ```text
//! ; comment
//! [train]
//! brakenotches = 8
//! [ats-p]
//! deceleration = 2.445
//! [atc]
//! signal8 = green:*/0@200
//! ```
//!
//! A device is fitted when its section is present. Speeds are km/h,
//! decelerations km/h/s, distances m and times s; everything is converted to
//! SI units on load. Any unknown section, unknown key or malformed value is
//! an error naming the line.

pub mod aspect;

pub use aspect::{parse_signal, AspectError};

use crate::cab::{Key, VehicleSpecs};
use crate::devices::{AtcConfig, AtsPConfig, AtsPsConfig, AtsSxConfig, EbConfig, TascConfig};
use crate::pattern::CurveParameters;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Upper bound for `brakenotches`.
pub const MAX_BRAKE_NOTCHES: u32 = 255;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: `{key}` appears before any section")]
    MissingSection { line: usize, key: String },
    #[error("line {line}: unknown section [{section}]")]
    UnknownSection { line: usize, section: String },
    #[error("line {line}: unknown key `{key}` in [{section}]")]
    UnknownKey { line: usize, section: String, key: String },
    #[error("line {line}: `{key}` expects a number, got `{value}`")]
    InvalidNumber { line: usize, key: String, value: String },
    #[error("line {line}: `{key}` expects true or false, got `{value}`")]
    InvalidBoolean { line: usize, key: String, value: String },
    #[error("line {line}: `{key}` names an unknown key `{value}`")]
    InvalidKey { line: usize, key: String, value: String },
    #[error("line {line}: expected `key = value`, got `{text}`")]
    Malformed { line: usize, text: String },
    #[error("line {line}: `{key} = {value}`: {reason}")]
    InvalidAspect {
        line: usize,
        key: String,
        value: String,
        reason: AspectError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Train,
    AtsSx,
    AtsPs,
    AtsP,
    Atc,
    Eb,
    Tasc,
}

impl Section {
    fn parse(name: &str) -> Option<Self> {
        let section = match name.trim().to_ascii_lowercase().as_str() {
            "train" => Section::Train,
            "ats-sx" => Section::AtsSx,
            "ats-ps" => Section::AtsPs,
            "ats-p" => Section::AtsP,
            "atc" => Section::Atc,
            "eb" => Section::Eb,
            "tasc" => Section::Tasc,
            _ => return None,
        };
        Some(section)
    }

    fn name(self) -> &'static str {
        match self {
            Section::Train => "train",
            Section::AtsSx => "ats-sx",
            Section::AtsPs => "ats-ps",
            Section::AtsP => "ats-p",
            Section::Atc => "atc",
            Section::Eb => "eb",
            Section::Tasc => "tasc",
        }
    }
}

/// Everything fitted to one train.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainConfig {
    pub specs: VehicleSpecs,
    pub ats_sx: Option<AtsSxConfig>,
    pub ats_ps: Option<AtsPsConfig>,
    pub ats_p: Option<AtsPConfig>,
    pub atc: Option<AtcConfig>,
    pub eb: Option<EbConfig>,
    pub tasc: Option<TascConfig>,
}

impl TrainConfig {
    /// Every device fitted with its defaults.
    pub fn fully_equipped() -> Self {
        Self {
            specs: VehicleSpecs::default(),
            ats_sx: Some(AtsSxConfig::default()),
            ats_ps: Some(AtsPsConfig::default()),
            ats_p: Some(AtsPConfig::default()),
            atc: Some(AtcConfig::default()),
            eb: Some(EbConfig::default()),
            tasc: Some(TascConfig::default()),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::parse(&text)?;
        info!("Loaded train configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = TrainConfig::default();
        let mut section: Option<Section> = None;
        // The built-in signal table is replaced by the first configured entry
        let mut custom_signals = false;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = strip_comment(raw).trim();
            if content.is_empty() {
                continue;
            }

            if let Some(name) = content.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
                let parsed = Section::parse(name).ok_or_else(|| ConfigError::UnknownSection {
                    line,
                    section: name.trim().to_string(),
                })?;
                config.fit(parsed);
                section = Some(parsed);
                continue;
            }

            let Some((key, value)) = content.split_once('=') else {
                return Err(ConfigError::Malformed {
                    line,
                    text: content.to_string(),
                });
            };
            let key = key.trim().to_ascii_lowercase();
            let Some(current) = section else {
                return Err(ConfigError::MissingSection { line, key });
            };
            let entry = Entry {
                line,
                key: &key,
                value: value.trim(),
            };

            match current {
                Section::Train => apply_train(&mut config.specs, &entry)?,
                Section::AtsSx => {
                    if let Some(sx) = config.ats_sx.as_mut() {
                        apply_ats_sx(sx, &entry)?;
                    }
                }
                Section::AtsPs => {
                    if let Some(ps) = config.ats_ps.as_mut() {
                        apply_ats_ps(ps, &entry)?;
                    }
                }
                Section::AtsP => {
                    if let Some(p) = config.ats_p.as_mut() {
                        apply_ats_p(p, &entry)?;
                    }
                }
                Section::Atc => {
                    if let Some(atc) = config.atc.as_mut() {
                        apply_atc(atc, &entry, &mut custom_signals)?;
                    }
                }
                Section::Eb => {
                    if let Some(eb) = config.eb.as_mut() {
                        apply_eb(eb, &entry)?;
                    }
                }
                Section::Tasc => {
                    if let Some(tasc) = config.tasc.as_mut() {
                        apply_tasc(tasc, &entry)?;
                    }
                }
            }
        }
        Ok(config)
    }

    fn fit(&mut self, section: Section) {
        match section {
            Section::Train => {}
            Section::AtsSx => {
                self.ats_sx.get_or_insert_with(AtsSxConfig::default);
            }
            Section::AtsPs => {
                self.ats_ps.get_or_insert_with(AtsPsConfig::default);
            }
            Section::AtsP => {
                self.ats_p.get_or_insert_with(AtsPConfig::default);
            }
            Section::Atc => {
                self.atc.get_or_insert_with(AtcConfig::default);
            }
            Section::Eb => {
                self.eb.get_or_insert_with(EbConfig::default);
            }
            Section::Tasc => {
                self.tasc.get_or_insert_with(TascConfig::default);
            }
        }
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(|c| c == ';' || c == '#') {
        Some(position) => &line[..position],
        None => line,
    }
}

/// One `key = value` line.
struct Entry<'a> {
    line: usize,
    key: &'a str,
    value: &'a str,
}

impl Entry<'_> {
    fn unknown(&self, section: Section) -> ConfigError {
        ConfigError::UnknownKey {
            line: self.line,
            section: section.name().to_string(),
            key: self.key.to_string(),
        }
    }

    fn invalid_number(&self) -> ConfigError {
        ConfigError::InvalidNumber {
            line: self.line,
            key: self.key.to_string(),
            value: self.value.to_string(),
        }
    }

    fn number(&self) -> Result<f64, ConfigError> {
        match self.value.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.invalid_number()),
        }
    }

    fn non_negative(&self) -> Result<f64, ConfigError> {
        let value = self.number()?;
        if value < 0.0 {
            return Err(self.invalid_number());
        }
        Ok(value)
    }

    /// km/h to m/s
    fn speed(&self) -> Result<f64, ConfigError> {
        Ok(self.number()? / 3.6)
    }

    /// km/h/s to m/s², must be positive
    fn deceleration(&self) -> Result<f64, ConfigError> {
        let value = self.number()?;
        if value <= 0.0 {
            return Err(self.invalid_number());
        }
        Ok(value / 3.6)
    }

    fn unsigned(&self) -> Result<u32, ConfigError> {
        self.value.parse::<u32>().map_err(|_| self.invalid_number())
    }

    /// Number of brake positions, leaving room for the emergency notch above.
    fn notch_count(&self) -> Result<u32, ConfigError> {
        match self.unsigned()? {
            count @ 1..=MAX_BRAKE_NOTCHES => Ok(count),
            _ => Err(self.invalid_number()),
        }
    }

    fn integer(&self) -> Result<i32, ConfigError> {
        self.value.parse::<i32>().map_err(|_| self.invalid_number())
    }

    fn boolean(&self) -> Result<bool, ConfigError> {
        match self.value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(ConfigError::InvalidBoolean {
                line: self.line,
                key: self.key.to_string(),
                value: self.value.to_string(),
            }),
        }
    }

    /// Comma-separated km/h list.
    fn speeds(&self) -> Result<Vec<f64>, ConfigError> {
        self.value
            .split(',')
            .map(|item| match item.trim().parse::<f64>() {
                Ok(speed) if speed.is_finite() && speed >= 0.0 => Ok(speed / 3.6),
                _ => Err(self.invalid_number()),
            })
            .collect()
    }

    fn keys(&self) -> Result<Vec<Key>, ConfigError> {
        self.value
            .split(',')
            .map(|item| {
                item.parse::<Key>().map_err(|()| ConfigError::InvalidKey {
                    line: self.line,
                    key: self.key.to_string(),
                    value: item.trim().to_string(),
                })
            })
            .collect()
    }
}

fn apply_train(specs: &mut VehicleSpecs, entry: &Entry<'_>) -> Result<(), ConfigError> {
    match entry.key {
        "brakenotches" => specs.brake_notches = entry.notch_count()?,
        "powernotches" => specs.power_notches = entry.unsigned()?,
        "atsnotch" => specs.ats_notch = entry.unsigned()?,
        "maxdeceleration" => specs.max_deceleration = entry.deceleration()?,
        _ => return Err(entry.unknown(Section::Train)),
    }
    Ok(())
}

/// Curve keys shared by ATS-P and ATS-Ps. Returns false for other keys.
fn apply_curve(curve: &mut CurveParameters, entry: &Entry<'_>) -> Result<bool, ConfigError> {
    match entry.key {
        "deceleration" => curve.deceleration = entry.deceleration()?,
        "brakedelay" => curve.brake_delay = entry.non_negative()?,
        "brakeoffset" => curve.brake_offset = entry.number()?,
        "braketolerance" => curve.brake_tolerance = entry.speed()?,
        "warningdelay" => curve.warning_delay = entry.non_negative()?,
        "warningoffset" => curve.warning_offset = entry.number()?,
        "warningtolerance" => curve.warning_tolerance = entry.speed()?,
        "releasespeed" => curve.release_speed = entry.speed()?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn apply_ats_sx(sx: &mut AtsSxConfig, entry: &Entry<'_>) -> Result<(), ConfigError> {
    match entry.key {
        "alarmduration" => sx.alarm_duration = entry.non_negative()?,
        "initializationduration" => sx.initialization_duration = entry.non_negative()?,
        "speedcheckduration" => sx.speed_check_duration = entry.non_negative()?,
        "resetspeed" => sx.reset_speed = entry.speed()?,
        "alarmaspect" => sx.alarm_aspect = entry.integer()?,
        _ => return Err(entry.unknown(Section::AtsSx)),
    }
    Ok(())
}

fn apply_ats_ps(ps: &mut AtsPsConfig, entry: &Entry<'_>) -> Result<(), ConfigError> {
    if apply_curve(&mut ps.curve, entry)? {
        return Ok(());
    }
    match entry.key {
        "approachspeed" => ps.approach_speed = entry.speed()?,
        "maximumspeed" => ps.maximum_speed = Some(entry.speed()?),
        _ => return Err(entry.unknown(Section::AtsPs)),
    }
    Ok(())
}

fn apply_ats_p(p: &mut AtsPConfig, entry: &Entry<'_>) -> Result<(), ConfigError> {
    if apply_curve(&mut p.curve, entry)? {
        return Ok(());
    }
    match entry.key {
        "initializationduration" => p.initialization_duration = entry.non_negative()?,
        "maximumspeed" => p.maximum_speed = Some(entry.speed()?),
        _ => return Err(entry.unknown(Section::AtsP)),
    }
    Ok(())
}

fn apply_atc(atc: &mut AtcConfig, entry: &Entry<'_>, custom_signals: &mut bool) -> Result<(), ConfigError> {
    if let Some(aspect) = entry.key.strip_prefix("signal") {
        let aspect = aspect.parse::<i32>().map_err(|_| entry.unknown(Section::Atc))?;
        let signal = parse_signal(aspect, entry.value).map_err(|reason| ConfigError::InvalidAspect {
            line: entry.line,
            key: entry.key.to_string(),
            value: entry.value.to_string(),
            reason,
        })?;
        if !*custom_signals {
            atc.signals.clear();
            *custom_signals = true;
        }
        atc.signals.retain(|existing| existing.aspect != aspect);
        atc.signals.push(signal);
        return Ok(());
    }
    match entry.key {
        "deceleration" => atc.regular.deceleration = entry.deceleration()?,
        "delay" => atc.regular.delay = entry.non_negative()?,
        "offset" => atc.regular.offset = entry.number()?,
        "orpdeceleration" => atc.overrun.deceleration = entry.deceleration()?,
        "orpdelay" => atc.overrun.delay = entry.non_negative()?,
        "orpoffset" => atc.overrun.offset = entry.number()?,
        "orpreleasespeed" => atc.orp_release_speed = entry.speed()?,
        "acceleration" => atc.acceleration = entry.deceleration()?,
        "longthreshold" => atc.long_threshold = entry.non_negative()?,
        "mediumthreshold" => atc.medium_threshold = entry.non_negative()?,
        "finalapproachmargin" => atc.final_approach_margin = entry.speed()?,
        "stageduration" => atc.stage_duration = entry.non_negative()?,
        "fullservicemargin" => atc.full_service_margin = entry.speed()?,
        "releasemargin" => atc.release_margin = entry.speed()?,
        "blocklength" => atc.block_length = entry.non_negative()?,
        "blockspeeds" => atc.block_speeds = entry.speeds()?,
        "maximumspeed" => atc.maximum_speed = entry.speed()?,
        "suppressiondistance" => atc.suppression_distance = entry.non_negative()?,
        "emergencyoperationspeed" => atc.emergency_operation_speed = entry.speed()?,
        "automaticswitch" => atc.automatic_switch = entry.boolean()?,
        _ => return Err(entry.unknown(Section::Atc)),
    }
    Ok(())
}

fn apply_eb(eb: &mut EbConfig, entry: &Entry<'_>) -> Result<(), ConfigError> {
    match entry.key {
        "bellthreshold" => eb.bell_threshold = entry.non_negative()?,
        "brakethreshold" => eb.brake_threshold = entry.non_negative()?,
        "standstillspeed" => eb.standstill_speed = entry.speed()?,
        "resetkeys" => eb.reset_keys = entry.keys()?,
        _ => return Err(entry.unknown(Section::Eb)),
    }
    Ok(())
}

fn apply_tasc(tasc: &mut TascConfig, entry: &Entry<'_>) -> Result<(), ConfigError> {
    match entry.key {
        "deceleration" => tasc.deceleration = entry.deceleration()?,
        "stoptolerance" => tasc.stop_tolerance = entry.non_negative()?,
        "releasedistance" => tasc.release_distance = entry.non_negative()?,
        "resetdistance" => tasc.reset_distance = entry.non_negative()?,
        "brakecontrolspeed" => tasc.brake_control_speed = entry.speed()?,
        "notchdelay" => tasc.notch_delay = entry.non_negative()?,
        "initialnotch" => tasc.initial_notch = entry.unsigned()?,
        _ => return Err(entry.unknown(Section::Tasc)),
    }
    Ok(())
}
