// Core value types shared by the slot generator, the ledger and the analytics engine

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CarId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub u64);

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "car#{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reservation#{}", self.0)
    }
}

/// Time of day as minutes since midnight.
///
/// `24:00` is representable so that a window or slot may end at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub fn from_minutes(minutes: u16) -> Result<Self, ValidationError> {
        if minutes > MINUTES_PER_DAY {
            return Err(ValidationError::InvalidTime(format!(
                "{minutes} minutes is past the end of the day"
            )));
        }
        Ok(Self(minutes))
    }

    pub fn hm(hour: u16, minute: u16) -> Result<Self, ValidationError> {
        if minute >= 60 {
            return Err(ValidationError::InvalidTime(format!(
                "{hour:02}:{minute:02} has an out of range minute"
            )));
        }
        Self::from_minutes(hour * 60 + minute)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    // None when the result would run past 24:00
    pub fn checked_add_minutes(self, minutes: u16) -> Option<Self> {
        let total = self.0.checked_add(minutes)?;
        (total <= MINUTES_PER_DAY).then_some(Self(total))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTime(format!("expected HH:MM, got {s:?}"));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u16 = h.parse().map_err(|_| invalid())?;
        let minute: u16 = m.parse().map_err(|_| invalid())?;
        Self::hm(hour, minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

// Daily opening hours of a car, [open, close)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingWindow {
    pub open: TimeOfDay,
    pub close: TimeOfDay,
}

impl OperatingWindow {
    pub fn new(open: TimeOfDay, close: TimeOfDay) -> Self {
        Self { open, close }
    }

    pub fn length_minutes(&self) -> u16 {
        self.close.minutes().saturating_sub(self.open.minutes())
    }
}

impl Default for OperatingWindow {
    fn default() -> Self {
        Self {
            open: TimeOfDay(8 * 60),
            close: TimeOfDay(18 * 60),
        }
    }
}

// Owned by the fleet collaborator, referenced here by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub car_id: CarId,
    pub model: String,
    pub license_plate: String,
    #[serde(default)]
    pub window: OperatingWindow,
}

impl Car {
    pub fn new(car_id: u64, model: &str, license_plate: &str) -> Self {
        Self {
            car_id: CarId(car_id),
            model: model.to_string(),
            license_plate: license_plate.to_string(),
            window: OperatingWindow::default(),
        }
    }

    pub fn with_window(mut self, window: OperatingWindow) -> Self {
        self.window = window;
        self
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.model, self.license_plate)
    }
}

/// A committed booking. Never mutated once it is in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub car_id: CarId,
    pub user_id: UserId,
    pub day: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    // Half-open interval overlap: [a, b) and [c, d) overlap iff a < d && c < b
    pub fn overlaps(&self, start: TimeOfDay, end: TimeOfDay) -> bool {
        self.start_time < end && start < self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_of_day_parse_and_display() {
        let t: TimeOfDay = "09:30".parse().unwrap();
        assert_eq!(t.minutes(), 570);
        assert_eq!(t.to_string(), "09:30");
        assert_eq!("24:00".parse::<TimeOfDay>().unwrap(), TimeOfDay::END_OF_DAY);

        assert!("9".parse::<TimeOfDay>().is_err());
        assert!("09:5".parse::<TimeOfDay>().is_err());
        assert!("09:60".parse::<TimeOfDay>().is_err());
        assert!("24:01".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_time_of_day_serde_as_string() {
        let t = TimeOfDay::hm(13, 0).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"13:00\"");
        let back: TimeOfDay = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<TimeOfDay>("\"25:00\"").is_err());
    }

    #[test]
    fn test_checked_add_stops_at_midnight() {
        let t = TimeOfDay::hm(22, 0).unwrap();
        assert_eq!(t.checked_add_minutes(120), Some(TimeOfDay::END_OF_DAY));
        assert_eq!(t.checked_add_minutes(121), None);
    }

    #[test]
    fn test_reservation_overlap_is_half_open() {
        let r = Reservation {
            reservation_id: ReservationId(1),
            car_id: CarId(1),
            user_id: UserId(1),
            day: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: TimeOfDay::hm(11, 0).unwrap(),
            end_time: TimeOfDay::hm(13, 0).unwrap(),
            created_at: Utc::now(),
        };

        let t = |h| TimeOfDay::hm(h, 0).unwrap();
        assert!(!r.overlaps(t(9), t(11)));
        assert!(!r.overlaps(t(13), t(15)));
        assert!(r.overlaps(t(12), t(14)));
        assert!(r.overlaps(t(10), t(12)));
        assert!(r.overlaps(t(11), t(13)));
    }
}
