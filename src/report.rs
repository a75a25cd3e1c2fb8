//! Serialisable snapshot of the cab after a tick.

use crate::cab::{DoorState, Handles};
use crate::devices::{Device, DeviceKind, DeviceState};
use crate::journal::TransitionRecord;
use crate::train::{TickOutput, Train, TrainStats};
use core::fmt::Write;
use serde::Serialize;

const RECENT_TRANSITIONS: usize = 8;
pub const CSV_ROW_CAPACITY: usize = 512;

#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub device: DeviceKind,
    pub state: DeviceState,
    /// Speed the device enforces, km/h.
    pub supervised_kmh: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub time: f64,
    pub location: f64,
    pub speed_kmh: f64,
    pub doors: DoorState,
    pub driver: Handles,
    pub output: Handles,
    pub devices: Vec<DeviceReport>,
    pub debug: String,
    pub recent_transitions: Vec<TransitionRecord>,
    pub stats: TrainStats,
}

impl TrainReport {
    pub fn capture(train: &Train, output: &TickOutput) -> Self {
        let cab = train.cab();
        let devices = train
            .devices()
            .iter()
            .map(|device| DeviceReport {
                device: device.kind(),
                state: device.device_state(),
                supervised_kmh: device.supervised_speed().map(|speed| speed * 3.6),
            })
            .collect();
        let records = train.journal().records();
        let recent_transitions = records[records.len().saturating_sub(RECENT_TRANSITIONS)..].to_vec();
        Self {
            time: cab.time,
            location: cab.location(),
            speed_kmh: cab.vehicle.speed * 3.6,
            doors: cab.doors,
            driver: cab.handles,
            output: output.handles,
            devices,
            debug: output.debug.to_string(),
            recent_transitions,
            stats: train.stats(),
        }
    }

    pub fn state_of(&self, device: DeviceKind) -> Option<DeviceState> {
        self.devices
            .iter()
            .find(|report| report.device == device)
            .map(|report| report.state)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn csv_header(&self) -> String {
        let mut header = String::from("time,location,speed_kmh,brake,power");
        for device in &self.devices {
            header.push(',');
            header.push_str(device.device.name());
        }
        header
    }

    pub fn csv_row(&self) -> Result<heapless::String<CSV_ROW_CAPACITY>, core::fmt::Error> {
        let mut row = heapless::String::new();
        write!(
            row,
            "{:.2},{:.2},{:.2},{},{}",
            self.time, self.location, self.speed_kmh, self.output.brake, self.output.power
        )?;
        for device in &self.devices {
            write!(row, ",{}", device.state)?;
        }
        Ok(row)
    }
}
