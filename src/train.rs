//! Orchestration of the fitted devices.
//!
//! The train owns every device, the cab status and the outputs. Each tick
//! runs the devices in chain order against one handle demand and one
//! blocking flag; events between ticks fan out to every device.

use crate::cab::{
    BeaconData, CabStatus, DoorState, HandleChange, HandleDemand, Handles, HornKind, Key, SignalData, TickInput,
    VehicleSpecs,
};
use crate::config::TrainConfig;
use crate::devices::{
    Atc, AtsP, AtsPs, AtsSx, Device, DeviceKind, DeviceState, Eb, Equipment, InitializationMode, Tasc, Tick,
};
use crate::journal::TransitionJournal;
use crate::output::{CabOutputs, DebugLine, SoundEvents, PANEL_SIZE};
use heapless::Vec;
use serde::Serialize;
use tracing::{info, trace};

/// Ticks outside `(0, MAX_TICK)` seconds are skipped.
pub const MAX_TICK: f64 = 1.0;

pub const MAX_DEVICES: usize = 6;

/// What the host applies after a tick.
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub handles: Handles,
    pub indicators: [i32; PANEL_SIZE],
    pub sounds: SoundEvents,
    pub debug: DebugLine,
}

/// Handle demand and blocking flag right after one device ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainStep {
    pub device: DeviceKind,
    pub brake: u32,
    pub power: u32,
    pub blocking: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrainStats {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub events: u64,
}

#[derive(Debug, Clone)]
pub struct Train {
    devices: Vec<Equipment, MAX_DEVICES>,
    cab: CabStatus,
    outputs: CabOutputs,
    journal: TransitionJournal,
    chain: Vec<ChainStep, MAX_DEVICES>,
    last_handles: Handles,
    stats: TrainStats,
}

impl Train {
    pub fn new(config: &TrainConfig) -> Self {
        let mut devices = Vec::new();
        for kind in DeviceKind::CHAIN {
            let device = match kind {
                DeviceKind::Tasc => config.tasc.map(|c| Equipment::Tasc(Tasc::new(c))),
                DeviceKind::Eb => config.eb.clone().map(|c| Equipment::Eb(Eb::new(c))),
                DeviceKind::Atc => config.atc.clone().map(|c| Equipment::Atc(Atc::new(c))),
                DeviceKind::AtsP => config.ats_p.map(|c| Equipment::AtsP(AtsP::new(c))),
                DeviceKind::AtsPs => config.ats_ps.map(|c| Equipment::AtsPs(AtsPs::new(c))),
                DeviceKind::AtsSx => config.ats_sx.map(|c| Equipment::AtsSx(AtsSx::new(c))),
            };
            if let Some(device) = device {
                let _ = devices.push(device);
            }
        }
        info!(
            "Train fitted with {}",
            devices
                .iter()
                .map(|d: &Equipment| d.kind().name())
                .collect::<std::vec::Vec<_>>()
                .join(", ")
        );
        Self {
            devices,
            cab: CabStatus::new(config.specs),
            outputs: CabOutputs::new(),
            journal: TransitionJournal::new(),
            chain: Vec::new(),
            last_handles: Handles::default(),
            stats: TrainStats::default(),
        }
    }

    pub fn initialize(&mut self, mode: InitializationMode) {
        info!("Initializing devices: {:?}", mode);
        self.dispatch(|device, cab| device.initialize(mode, cab));
    }

    pub fn elapse(&mut self, input: &TickInput) -> TickOutput {
        if !(input.elapsed > 0.0 && input.elapsed < MAX_TICK) {
            trace!("Skipping tick of {} s", input.elapsed);
            self.stats.skipped_ticks += 1;
            return TickOutput {
                handles: input.handles,
                indicators: *self.outputs.indicators(),
                sounds: SoundEvents::new(),
                debug: *self.outputs.debug_line(),
            };
        }

        if input.doors != self.cab.doors {
            self.door_change(input.doors);
        }
        self.cab.vehicle = input.vehicle;
        self.cab.handles = input.handles;
        self.cab.preceding_distance = input.preceding_distance;
        self.cab.time += input.elapsed;
        self.stats.ticks += 1;

        let cab = self.cab;
        let mut demand = HandleDemand::new(input.handles);
        if cab.doors.is_open() {
            demand.cut_power();
        }
        let mut blocking = false;
        self.outputs.begin_tick();
        self.chain.clear();
        {
            let mut tick = Tick {
                elapsed: input.elapsed,
                cab: &cab,
                handles: &mut demand,
                blocking: &mut blocking,
                out: &mut self.outputs,
            };
            for device in self.devices.iter_mut() {
                let before = device.device_state();
                device.elapse(&mut tick);
                let after = device.device_state();
                if before != after {
                    self.journal.record(before, after, cab.location(), cab.time);
                }
                let _ = self.chain.push(ChainStep {
                    device: device.kind(),
                    brake: tick.handles.brake(),
                    power: tick.handles.power(),
                    blocking: *tick.blocking,
                });
            }
        }
        self.outputs.finish_tick();
        self.last_handles = demand.handles();

        TickOutput {
            handles: demand.handles(),
            indicators: *self.outputs.indicators(),
            sounds: self.outputs.events().clone(),
            debug: *self.outputs.debug_line(),
        }
    }

    pub fn set_signal(&mut self, signals: &[SignalData]) {
        self.dispatch(|device, cab| device.set_signal(signals, cab));
    }

    pub fn set_beacon(&mut self, beacon: &BeaconData) {
        self.dispatch(|device, cab| device.set_beacon(beacon, cab));
    }

    pub fn key_down(&mut self, key: Key) {
        self.dispatch(|device, cab| device.key_down(key, cab));
    }

    pub fn key_up(&mut self, key: Key) {
        self.dispatch(|device, cab| device.key_up(key, cab));
    }

    pub fn horn_blow(&mut self, horn: HornKind) {
        self.dispatch(|device, cab| device.horn_blow(horn, cab));
    }

    pub fn door_change(&mut self, doors: DoorState) {
        let old = self.cab.doors;
        self.cab.doors = doors;
        if old != doors {
            self.dispatch(|device, cab| device.door_change(old, doors, cab));
        }
    }

    pub fn handle_change(&mut self, change: HandleChange) {
        match change {
            HandleChange::Reverser(position) => self.cab.handles.reverser = position,
            HandleChange::Power(notch) => self.cab.handles.power = notch,
            HandleChange::Brake(notch) => self.cab.handles.brake = notch,
        }
        self.dispatch(|device, cab| device.handle_change(change, cab));
    }

    /// Runs an event on every device, journaling any state change.
    fn dispatch<F>(&mut self, mut event: F)
    where
        F: FnMut(&mut Equipment, &CabStatus),
    {
        let cab = self.cab;
        self.stats.events += 1;
        for device in self.devices.iter_mut() {
            let before = device.device_state();
            event(device, &cab);
            let after = device.device_state();
            if before != after {
                self.journal.record(before, after, cab.location(), cab.time);
            }
        }
    }

    pub fn devices(&self) -> &[Equipment] {
        &self.devices
    }

    pub fn device(&self, kind: DeviceKind) -> Option<&Equipment> {
        self.devices.iter().find(|device| device.kind() == kind)
    }

    pub fn device_state(&self, kind: DeviceKind) -> Option<DeviceState> {
        self.device(kind).map(Device::device_state)
    }

    pub fn tasc(&self) -> Option<&Tasc> {
        self.devices.iter().find_map(|device| match device {
            Equipment::Tasc(tasc) => Some(tasc),
            _ => None,
        })
    }

    pub fn eb(&self) -> Option<&Eb> {
        self.devices.iter().find_map(|device| match device {
            Equipment::Eb(eb) => Some(eb),
            _ => None,
        })
    }

    pub fn atc(&self) -> Option<&Atc> {
        self.devices.iter().find_map(|device| match device {
            Equipment::Atc(atc) => Some(atc),
            _ => None,
        })
    }

    pub fn ats_p(&self) -> Option<&AtsP> {
        self.devices.iter().find_map(|device| match device {
            Equipment::AtsP(ats_p) => Some(ats_p),
            _ => None,
        })
    }

    pub fn ats_ps(&self) -> Option<&AtsPs> {
        self.devices.iter().find_map(|device| match device {
            Equipment::AtsPs(ats_ps) => Some(ats_ps),
            _ => None,
        })
    }

    pub fn ats_sx(&self) -> Option<&AtsSx> {
        self.devices.iter().find_map(|device| match device {
            Equipment::AtsSx(ats_sx) => Some(ats_sx),
            _ => None,
        })
    }

    pub fn cab(&self) -> &CabStatus {
        &self.cab
    }

    pub fn specs(&self) -> &VehicleSpecs {
        &self.cab.specs
    }

    pub fn outputs(&self) -> &CabOutputs {
        &self.outputs
    }

    pub fn journal(&self) -> &TransitionJournal {
        &self.journal
    }

    /// Per-device handle demand of the last tick, in chain order.
    pub fn chain(&self) -> &[ChainStep] {
        &self.chain
    }

    /// Handles returned by the last tick that ran.
    pub fn last_handles(&self) -> Handles {
        self.last_handles
    }

    pub fn stats(&self) -> TrainStats {
        self.stats
    }
}
