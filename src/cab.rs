use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Aspects at or above this value mean the host reports no signal.
pub const NO_SIGNAL_ASPECT: i32 = 10;

/// Red signal aspect.
pub const RED_ASPECT: i32 = 0;

/// Speeds below this count as standstill for resets and mode switches.
pub const STANDSTILL_SPEED: f64 = 0.5 / 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleKinematics {
    pub location: f64,
    pub speed: f64,
    pub acceleration: f64,
}

impl Default for VehicleKinematics {
    fn default() -> Self {
        Self {
            location: 0.0,
            speed: 0.0,
            acceleration: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Handles {
    pub reverser: i32,
    pub power: u32,
    pub brake: u32,
    pub const_speed: bool,
}

/// Per-tick handle record shared along the device chain.
///
/// The brake notch only ratchets upward and the power notch only drops,
/// whatever order the devices write in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleDemand {
    handles: Handles,
}

impl HandleDemand {
    pub fn new(handles: Handles) -> Self {
        Self { handles }
    }

    pub fn apply_brake(&mut self, notch: u32) {
        if notch > self.handles.brake {
            self.handles.brake = notch;
        }
        if notch > 0 {
            self.handles.power = 0;
            self.handles.const_speed = false;
        }
    }

    pub fn cut_power(&mut self) {
        self.handles.power = 0;
    }

    pub fn brake(&self) -> u32 {
        self.handles.brake
    }

    pub fn power(&self) -> u32 {
        self.handles.power
    }

    pub fn reverser(&self) -> i32 {
        self.handles.reverser
    }

    pub fn handles(&self) -> Handles {
        self.handles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleSpecs {
    pub brake_notches: u32,
    pub power_notches: u32,
    /// Lowest brake notch accepted as "brakes applied" for ATS acknowledgement.
    pub ats_notch: u32,
    /// Service deceleration at the highest brake notch, m/s².
    pub max_deceleration: f64,
}

impl VehicleSpecs {
    pub fn emergency_notch(&self) -> u32 {
        self.brake_notches.saturating_add(1)
    }
}

impl Default for VehicleSpecs {
    fn default() -> Self {
        Self {
            brake_notches: 8,
            power_notches: 5,
            ats_notch: 1,
            max_deceleration: 4.0 / 3.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DoorState {
    #[default]
    Closed,
    Open,
}

impl DoorState {
    pub fn is_open(self) -> bool {
        self == DoorState::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HornKind {
    Primary,
    Secondary,
    Music,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleChange {
    Reverser(i32),
    Power(u32),
    Brake(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    S,
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
}

impl FromStr for Key {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.trim().to_ascii_uppercase().as_str() {
            "S" => Key::S,
            "A1" => Key::A1,
            "A2" => Key::A2,
            "B1" => Key::B1,
            "B2" => Key::B2,
            "C1" => Key::C1,
            "C2" => Key::C2,
            "D" => Key::D,
            "E" => Key::E,
            "F" => Key::F,
            "G" => Key::G,
            "H" => Key::H,
            "I" => Key::I,
            "J" => Key::J,
            "K" => Key::K,
            "L" => Key::L,
            _ => return Err(()),
        };
        Ok(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeaconData {
    pub kind: i32,
    pub optional: i32,
    pub signal_aspect: i32,
    pub signal_distance: f64,
}

impl BeaconData {
    pub fn new(kind: i32, optional: i32, signal_aspect: i32, signal_distance: f64) -> Self {
        Self {
            kind,
            optional,
            signal_aspect,
            signal_distance,
        }
    }

    pub fn signal_is_red(&self) -> bool {
        self.signal_aspect == RED_ASPECT
    }

    /// Splits a `distance * 1000 + km/h` payload into metres and m/s.
    pub fn distance_and_speed(&self) -> Option<(f64, f64)> {
        if self.optional <= 0 {
            return None;
        }
        let distance = f64::from(self.optional / 1000);
        let speed = f64::from(self.optional % 1000) / 3.6;
        Some((distance, speed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalData {
    pub aspect: i32,
    pub distance: f64,
}

/// Read-only view of the cab shared with every device for one tick or event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CabStatus {
    pub vehicle: VehicleKinematics,
    pub handles: Handles,
    pub doors: DoorState,
    pub preceding_distance: Option<f64>,
    pub specs: VehicleSpecs,
    pub time: f64,
}

impl CabStatus {
    pub fn new(specs: VehicleSpecs) -> Self {
        Self {
            vehicle: VehicleKinematics::default(),
            handles: Handles::default(),
            doors: DoorState::Closed,
            preceding_distance: None,
            specs,
            time: 0.0,
        }
    }

    pub fn location(&self) -> f64 {
        self.vehicle.location
    }

    pub fn speed(&self) -> f64 {
        self.vehicle.speed.abs()
    }

    pub fn is_stopped(&self) -> bool {
        self.vehicle.speed.abs() < STANDSTILL_SPEED
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInput {
    pub elapsed: f64,
    pub vehicle: VehicleKinematics,
    pub handles: Handles,
    pub doors: DoorState,
    pub preceding_distance: Option<f64>,
}
