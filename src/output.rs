use arrayvec::ArrayString;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

pub const PANEL_SIZE: usize = 256;
pub const MAX_SOUND_EVENTS: usize = 32;
pub const DEBUG_CAPACITY: usize = 512;

pub type DebugLine = ArrayString<DEBUG_CAPACITY>;

/// Panel indicator indices written by the devices.
pub mod indicator {
    pub const SX_POWER: usize = 0;
    pub const SX_ALARM: usize = 1;
    pub const SX_EMERGENCY: usize = 2;
    pub const PS_POWER: usize = 3;
    pub const PS_PATTERN: usize = 4;
    pub const PS_APPROACH: usize = 5;
    pub const PS_BRAKE: usize = 6;
    pub const P_POWER: usize = 7;
    pub const P_ACTIVE: usize = 8;
    pub const P_PATTERN: usize = 9;
    pub const P_BRAKE: usize = 10;
    pub const P_RELEASE: usize = 11;
    pub const ATC_POWER: usize = 12;
    pub const ATC_ACTIVE: usize = 13;
    pub const ATC_GREEN: usize = 14;
    pub const ATC_RED: usize = 15;
    pub const ATC_P: usize = 16;
    pub const ATC_X: usize = 17;
    /// Enforced speed in km/h.
    pub const ATC_SPEED: usize = 18;
    pub const ATC_SERVICE: usize = 19;
    pub const ATC_EMERGENCY: usize = 20;
    pub const ATC_ADVANCE: usize = 21;
    pub const ATC_ATS: usize = 22;
    pub const ATC_EMERGENCY_OPERATION: usize = 23;
    pub const EB_WARNING: usize = 24;
    pub const TASC_POWER: usize = 25;
    pub const TASC_PATTERN: usize = 26;
    /// Brake notch currently demanded by TASC.
    pub const TASC_NOTCH: usize = 27;
    pub const TASC_HOME_DOOR: usize = 28;
    pub const TASC_OVERRIDE: usize = 29;

    pub const LAST: usize = TASC_OVERRIDE;
}

const_assert!(indicator::LAST < PANEL_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Sound {
    AtsBell = 0,
    AtsChime = 1,
    AtsPDing = 2,
    AtsPBrakeApply = 3,
    AtsPBrakeRelease = 4,
    AtsPsApproach = 5,
    AtsPsBrake = 6,
    AtcDing = 7,
    AtcSwitchReminder = 8,
    AtcEmergency = 9,
    EbBell = 10,
    TascAnnounce = 11,
}

const SOUND_COUNT: usize = 12;
const_assert!(SOUND_COUNT <= 32);

impl Sound {
    pub fn index(self) -> usize {
        self as usize
    }

    fn from_index(index: usize) -> Option<Self> {
        let sound = match index {
            0 => Sound::AtsBell,
            1 => Sound::AtsChime,
            2 => Sound::AtsPDing,
            3 => Sound::AtsPBrakeApply,
            4 => Sound::AtsPBrakeRelease,
            5 => Sound::AtsPsApproach,
            6 => Sound::AtsPsBrake,
            7 => Sound::AtcDing,
            8 => Sound::AtcSwitchReminder,
            9 => Sound::AtcEmergency,
            10 => Sound::EbBell,
            11 => Sound::TascAnnounce,
            _ => return None,
        };
        Some(sound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundCommand {
    PlayOnce,
    StartLoop,
    StopLoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundEvent {
    pub sound: Sound,
    pub command: SoundCommand,
}

pub type SoundEvents = Vec<SoundEvent, MAX_SOUND_EVENTS>;

/// Write capability handed to devices during a tick.
pub trait OutputSink {
    fn set_indicator(&mut self, index: usize, value: i32);
    /// Fire-and-forget sound.
    fn play(&mut self, sound: Sound);
    /// Request a looping sound for this tick; it stops on the first tick
    /// nobody asks for it.
    fn keep_playing(&mut self, sound: Sound);
    fn debug(&mut self, text: &str);
}

/// Panel, sound and debug state of the cab.
#[derive(Debug, Clone)]
pub struct CabOutputs {
    indicators: [i32; PANEL_SIZE],
    requested_loops: u32,
    playing_loops: u32,
    events: SoundEvents,
    debug: DebugLine,
}

impl CabOutputs {
    pub fn new() -> Self {
        Self {
            indicators: [0; PANEL_SIZE],
            requested_loops: 0,
            playing_loops: 0,
            events: Vec::new(),
            debug: ArrayString::new(),
        }
    }

    pub fn begin_tick(&mut self) {
        self.indicators = [0; PANEL_SIZE];
        self.requested_loops = 0;
        self.events.clear();
        self.debug.clear();
    }

    /// Turns this tick's loop requests into start/stop events.
    pub fn finish_tick(&mut self) {
        let started = self.requested_loops & !self.playing_loops;
        let stopped = self.playing_loops & !self.requested_loops;
        for index in 0..SOUND_COUNT {
            let Some(sound) = Sound::from_index(index) else {
                continue;
            };
            let bit = 1u32 << index;
            if started & bit != 0 {
                self.push_event(sound, SoundCommand::StartLoop);
            } else if stopped & bit != 0 {
                self.push_event(sound, SoundCommand::StopLoop);
            }
        }
        self.playing_loops = self.requested_loops;
    }

    fn push_event(&mut self, sound: Sound, command: SoundCommand) {
        // Overflow drops the event; the panel state is still correct.
        let _ = self.events.push(SoundEvent { sound, command });
    }

    pub fn indicators(&self) -> &[i32; PANEL_SIZE] {
        &self.indicators
    }

    pub fn indicator(&self, index: usize) -> i32 {
        self.indicators.get(index).copied().unwrap_or(0)
    }

    pub fn events(&self) -> &SoundEvents {
        &self.events
    }

    pub fn is_looping(&self, sound: Sound) -> bool {
        self.playing_loops & (1u32 << sound.index()) != 0
    }

    pub fn debug_line(&self) -> &DebugLine {
        &self.debug
    }
}

impl Default for CabOutputs {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for CabOutputs {
    fn set_indicator(&mut self, index: usize, value: i32) {
        if let Some(slot) = self.indicators.get_mut(index) {
            *slot = value;
        }
    }

    fn play(&mut self, sound: Sound) {
        self.push_event(sound, SoundCommand::PlayOnce);
    }

    fn keep_playing(&mut self, sound: Sound) {
        self.requested_loops |= 1u32 << sound.index();
    }

    fn debug(&mut self, text: &str) {
        if !self.debug.is_empty() {
            let _ = self.debug.try_push_str(" | ");
        }
        let _ = self.debug.try_push_str(text);
    }
}
