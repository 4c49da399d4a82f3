// Slot generation: tiles a car's operating window into fixed-length slots

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    model::{Car, OperatingWindow, TimeOfDay},
};

/// A bookable half-open interval `[start_time, end_time)` on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub day: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

impl Slot {
    pub fn overlaps(&self, start: TimeOfDay, end: TimeOfDay) -> bool {
        self.start_time < end && start < self.end_time
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end_time.minutes() - self.start_time.minutes()
    }
}

/// Produces the candidate slots of an operating window.
///
/// If the window length is not a multiple of the slot duration the
/// trailing partial interval is dropped: a 09:00-18:00 window with 2h
/// slots yields four slots ending at 17:00, never a 1h stub.
#[derive(Debug, Clone, Copy)]
pub struct SlotGenerator {
    window: OperatingWindow,
    slot_minutes: u16,
}

impl SlotGenerator {
    pub fn new(window: OperatingWindow, slot_minutes: u16) -> Result<Self, ConfigError> {
        if slot_minutes == 0 {
            return Err(ConfigError::ZeroSlotDuration);
        }
        if window.close <= window.open {
            return Err(ConfigError::EmptyWindow {
                open: window.open,
                close: window.close,
            });
        }
        Ok(Self {
            window,
            slot_minutes,
        })
    }

    pub fn for_car(car: &Car, slot_minutes: u16) -> Result<Self, ConfigError> {
        Self::new(car.window, slot_minutes)
    }

    pub fn slot_minutes(&self) -> u16 {
        self.slot_minutes
    }

    pub fn slots_per_day(&self) -> usize {
        (self.window.length_minutes() / self.slot_minutes) as usize
    }

    pub fn generate(&self, day: NaiveDate) -> Slots {
        Slots {
            day,
            next: self.window.open,
            close: self.window.close,
            slot_minutes: self.slot_minutes,
        }
    }

    // The slot starting exactly at `start`, if `start` is a generated boundary
    pub fn slot_at(&self, day: NaiveDate, start: TimeOfDay) -> Option<Slot> {
        if start < self.window.open {
            return None;
        }
        let offset = start.minutes() - self.window.open.minutes();
        if offset % self.slot_minutes != 0 {
            return None;
        }
        let end = start.checked_add_minutes(self.slot_minutes)?;
        (end <= self.window.close).then_some(Slot {
            day,
            start_time: start,
            end_time: end,
        })
    }
}

/// Lazy slot sequence for one day. Cloning restarts from the current position;
/// calling [`SlotGenerator::generate`] again restarts from the opening time.
#[derive(Debug, Clone)]
pub struct Slots {
    day: NaiveDate,
    next: TimeOfDay,
    close: TimeOfDay,
    slot_minutes: u16,
}

impl Iterator for Slots {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        let end = self.next.checked_add_minutes(self.slot_minutes)?;
        if end > self.close {
            return None;
        }
        let slot = Slot {
            day: self.day,
            start_time: self.next,
            end_time: end,
        };
        self.next = end;
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.close.minutes().saturating_sub(self.next.minutes()) / self.slot_minutes)
            as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Slots {}
