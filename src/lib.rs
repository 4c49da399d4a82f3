// Reservation and availability engine for a small car fleet

pub mod analytics;
pub mod availability;
pub mod boundary;
pub mod circuit_breaker;
pub mod clock;
pub mod committer;
pub mod config;
pub mod error;
pub mod fleet;
pub mod guard;
pub mod journal;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod retry;
pub mod slots;

// Re-export key types for convenience
pub use analytics::{
    AnalyticsEngine, BookingSummary, CarUtilization, DailyRevenue, DashboardSummary, DateWindow,
    PopularCar, PopularSlot, UserActivity,
};
pub use availability::{AvailabilityResolver, CarStatus, UpcomingBooking};
pub use boundary::{AdminCapability, Caller, Health, ReservationDesk};
pub use clock::{Clock, FixedClock, SystemClock};
pub use committer::ReservationCommitter;
pub use config::EngineConfig;
pub use error::{ConfigError, ErrorKind, ReservationError, Result, ValidationError};
pub use fleet::{CarCatalog, InMemoryFleet};
pub use journal::JournalLedger;
pub use ledger::{InMemoryLedger, InsertOutcome, LedgerError, LedgerStore, NewReservation};
pub use model::{Car, CarId, OperatingWindow, Reservation, ReservationId, TimeOfDay, UserId};
pub use slots::{Slot, SlotGenerator};
