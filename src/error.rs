// Error types for the reservation engine

use chrono::NaiveDate;
use thiserror::Error;

use crate::{
    ledger::LedgerError,
    model::{CarId, ReservationId, TimeOfDay},
};

pub type Result<T> = std::result::Result<T, ReservationError>;

// Malformed or out-of-policy input. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Cannot book {day}: the date is in the past (today is {today})")]
    PastDate { day: NaiveDate, today: NaiveDate },

    #[error("{start} is not a slot boundary for {car_id}")]
    MisalignedSlot { car_id: CarId, start: TimeOfDay },

    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum ReservationError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Slot {start}-{end} on {day} for {car_id} is no longer available")]
    Conflict {
        car_id: CarId,
        day: NaiveDate,
        start: TimeOfDay,
        end: TimeOfDay,
    },

    #[error("Car not found: {0}")]
    CarNotFound(CarId),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    #[error("Storage error: {0}")]
    Storage(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Admin capability required for {0}")]
    Forbidden(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Storage,
    Forbidden,
}

impl ReservationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReservationError::Validation(_) | ReservationError::Config(_) => {
                ErrorKind::Validation
            }
            ReservationError::Conflict { .. } => ErrorKind::Conflict,
            ReservationError::CarNotFound(_) | ReservationError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            ReservationError::Storage(_) => ErrorKind::Storage,
            ReservationError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }

    // Only the storage layer retries; a conflict goes back to the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReservationError::Storage(e) if e.is_transient())
    }
}

// Invalid engine configuration, reported at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid operating window: close {close} is not after open {open}")]
    EmptyWindow { open: TimeOfDay, close: TimeOfDay },

    #[error("Slot duration must be positive")]
    ZeroSlotDuration,

    #[error("Invalid setting {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let conflict = ReservationError::Conflict {
            car_id: CarId(1),
            day,
            start: TimeOfDay::hm(9, 0).unwrap(),
            end: TimeOfDay::hm(11, 0).unwrap(),
        };
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(!conflict.is_retryable());

        assert_eq!(ReservationError::CarNotFound(CarId(9)).kind(), ErrorKind::NotFound);

        let past: ReservationError = ValidationError::PastDate { day, today: day }.into();
        assert_eq!(past.kind(), ErrorKind::Validation);

        let unavailable: ReservationError = LedgerError::Unavailable("down".into()).into();
        assert_eq!(unavailable.kind(), ErrorKind::Storage);
        assert!(unavailable.is_retryable());

        let corrupt: ReservationError = LedgerError::Corrupt {
            line: 3,
            message: "bad json".into(),
        }
        .into();
        assert!(!corrupt.is_retryable());
    }
}
