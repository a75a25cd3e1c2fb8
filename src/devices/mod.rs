//! Protection devices fitted to the cab.
//!
//! Every device implements [`Device`]. The train owns them as a closed set of
//! [`Equipment`] variants and calls them in [`DeviceKind::CHAIN`] order once
//! per tick, handing each a [`Tick`] with the shared handle demand, the
//! blocking flag and the output sink.

pub mod ats_p;
pub mod ats_ps;
pub mod ats_sx;
pub mod atc;
pub mod eb;
pub mod tasc;

pub use ats_p::{AtsP, AtsPConfig};
pub use ats_ps::{AtsPs, AtsPsConfig};
pub use ats_sx::{AtsSx, AtsSxConfig};
pub use atc::{Atc, AtcConfig};
pub use eb::{Eb, EbConfig};
pub use tasc::{Tasc, TascConfig};

use crate::cab::{BeaconData, CabStatus, DoorState, HandleChange, HandleDemand, HornKind, Key, SignalData};
use crate::output::OutputSink;
use core::fmt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Tasc,
    Eb,
    Atc,
    AtsP,
    AtsPs,
    AtsSx,
}

impl DeviceKind {
    /// Per-tick call order.
    pub const CHAIN: [DeviceKind; 6] = [
        DeviceKind::Tasc,
        DeviceKind::Eb,
        DeviceKind::Atc,
        DeviceKind::AtsP,
        DeviceKind::AtsPs,
        DeviceKind::AtsSx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Tasc => "TASC",
            DeviceKind::Eb => "EB",
            DeviceKind::Atc => "ATC",
            DeviceKind::AtsP => "ATS-P",
            DeviceKind::AtsPs => "ATS-Ps",
            DeviceKind::AtsSx => "ATS-Sx",
        }
    }

    pub fn chain_position(self) -> usize {
        match self {
            DeviceKind::Tasc => 0,
            DeviceKind::Eb => 1,
            DeviceKind::Atc => 2,
            DeviceKind::AtsP => 3,
            DeviceKind::AtsPs => 4,
            DeviceKind::AtsSx => 5,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the cab is set up when the simulation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitializationMode {
    /// Devices powered and in service.
    OnService,
    /// Devices powered, emergency brake applied.
    OnEmergency,
    /// Devices switched off.
    OffEmergency,
}

/// The state of one device, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Tasc(tasc::State),
    Eb(eb::State),
    Atc(atc::State),
    AtsP(ats_p::State),
    AtsPs(ats_ps::State),
    AtsSx(ats_sx::State),
}

impl DeviceState {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceState::Tasc(_) => DeviceKind::Tasc,
            DeviceState::Eb(_) => DeviceKind::Eb,
            DeviceState::Atc(_) => DeviceKind::Atc,
            DeviceState::AtsP(_) => DeviceKind::AtsP,
            DeviceState::AtsPs(_) => DeviceKind::AtsPs,
            DeviceState::AtsSx(_) => DeviceKind::AtsSx,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Tasc(state) => write!(f, "{:?}", state),
            DeviceState::Eb(state) => write!(f, "{:?}", state),
            DeviceState::Atc(state) => write!(f, "{:?}", state),
            DeviceState::AtsP(state) => write!(f, "{:?}", state),
            DeviceState::AtsPs(state) => write!(f, "{:?}", state),
            DeviceState::AtsSx(state) => write!(f, "{:?}", state),
        }
    }
}

/// Everything a device may read or write during one tick.
pub struct Tick<'a> {
    pub elapsed: f64,
    pub cab: &'a CabStatus,
    pub handles: &'a mut HandleDemand,
    /// Set by a device that takes over supervision from those after it.
    pub blocking: &'a mut bool,
    pub out: &'a mut dyn OutputSink,
}

pub trait Device {
    fn kind(&self) -> DeviceKind;
    fn device_state(&self) -> DeviceState;
    /// Speed currently enforced by the device, if any.
    fn supervised_speed(&self) -> Option<f64>;

    fn initialize(&mut self, mode: InitializationMode, cab: &CabStatus);
    fn elapse(&mut self, tick: &mut Tick<'_>);

    fn key_down(&mut self, key: Key, cab: &CabStatus);
    fn key_up(&mut self, key: Key, cab: &CabStatus);
    fn set_signal(&mut self, signals: &[SignalData], cab: &CabStatus);
    fn set_beacon(&mut self, beacon: &BeaconData, cab: &CabStatus);
    fn door_change(&mut self, old: DoorState, new: DoorState, cab: &CabStatus);
    fn horn_blow(&mut self, horn: HornKind, cab: &CabStatus);
    fn handle_change(&mut self, change: HandleChange, cab: &CabStatus);
}

/// The closed set of devices a train can carry.
#[derive(Debug, Clone)]
pub enum Equipment {
    Tasc(Tasc),
    Eb(Eb),
    Atc(Atc),
    AtsP(AtsP),
    AtsPs(AtsPs),
    AtsSx(AtsSx),
}

macro_rules! dispatch {
    ($self:expr, $device:ident => $call:expr) => {
        match $self {
            Equipment::Tasc($device) => $call,
            Equipment::Eb($device) => $call,
            Equipment::Atc($device) => $call,
            Equipment::AtsP($device) => $call,
            Equipment::AtsPs($device) => $call,
            Equipment::AtsSx($device) => $call,
        }
    };
}

impl Device for Equipment {
    fn kind(&self) -> DeviceKind {
        dispatch!(self, d => d.kind())
    }

    fn device_state(&self) -> DeviceState {
        dispatch!(self, d => d.device_state())
    }

    fn supervised_speed(&self) -> Option<f64> {
        dispatch!(self, d => d.supervised_speed())
    }

    fn initialize(&mut self, mode: InitializationMode, cab: &CabStatus) {
        dispatch!(self, d => d.initialize(mode, cab))
    }

    fn elapse(&mut self, tick: &mut Tick<'_>) {
        dispatch!(self, d => d.elapse(tick))
    }

    fn key_down(&mut self, key: Key, cab: &CabStatus) {
        dispatch!(self, d => d.key_down(key, cab))
    }

    fn key_up(&mut self, key: Key, cab: &CabStatus) {
        dispatch!(self, d => d.key_up(key, cab))
    }

    fn set_signal(&mut self, signals: &[SignalData], cab: &CabStatus) {
        dispatch!(self, d => d.set_signal(signals, cab))
    }

    fn set_beacon(&mut self, beacon: &BeaconData, cab: &CabStatus) {
        dispatch!(self, d => d.set_beacon(beacon, cab))
    }

    fn door_change(&mut self, old: DoorState, new: DoorState, cab: &CabStatus) {
        dispatch!(self, d => d.door_change(old, new, cab))
    }

    fn horn_blow(&mut self, horn: HornKind, cab: &CabStatus) {
        dispatch!(self, d => d.horn_blow(horn, cab))
    }

    fn handle_change(&mut self, change: HandleChange, cab: &CabStatus) {
        dispatch!(self, d => d.handle_change(change, cab))
    }
}
