use crate::devices::{DeviceKind, DeviceState};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MAX_JOURNAL_ENTRIES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: u32,
    pub device: DeviceKind,
    pub from: DeviceState,
    pub to: DeviceState,
    /// Train location when the change was seen, m.
    pub location: f64,
    /// Running time, s.
    pub time: f64,
}

/// Most recent device state changes, oldest evicted first.
#[derive(Debug, Clone)]
pub struct TransitionJournal {
    records: Vec<TransitionRecord, MAX_JOURNAL_ENTRIES>,
    next_id: u32,
}

impl TransitionJournal {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
        }
    }

    pub fn record(&mut self, from: DeviceState, to: DeviceState, location: f64, time: f64) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let record = TransitionRecord {
            id,
            device: to.kind(),
            from,
            to,
            location,
            time,
        };
        debug!(
            "{} {} -> {} at {:.1} m, {:.1} s",
            record.device, from, to, location, time
        );

        if self.records.is_full() {
            self.records.remove(0);
        }
        let _ = self.records.push(record);
        id
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn transitions_of(&self, device: DeviceKind) -> impl Iterator<Item = &TransitionRecord> {
        self.records.iter().filter(move |record| record.device == device)
    }

    /// States `device` went through, in order, starting with the first `from`.
    pub fn path_of(&self, device: DeviceKind) -> std::vec::Vec<DeviceState> {
        let mut path = std::vec::Vec::new();
        for record in self.transitions_of(device) {
            if path.is_empty() {
                path.push(record.from);
            }
            path.push(record.to);
        }
        path
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.last()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for TransitionJournal {
    fn default() -> Self {
        Self::new()
    }
}
