// Reservation ledger: the authoritative, append-only store of committed reservations.
// The only write is an atomic "insert if no overlap" for one (car, day) key;
// everything else is a read.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{CarId, Reservation, ReservationId, TimeOfDay, UserId};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt ledger entry at line {line}: {message}")]
    Corrupt { line: usize, message: String },

    #[error("Ledger circuit open, not calling the store for {0}")]
    CircuitOpen(&'static str),

    #[error("Journal {0} is in an unknown state after a failed rollback")]
    Poisoned(String),
}

impl LedgerError {
    // Transient failures may succeed on retry; the rest are fatal
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

/// A request to append, before the ledger has assigned an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub car_id: CarId,
    pub user_id: UserId,
    pub day: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub created_at: DateTime<Utc>,
}

impl NewReservation {
    fn into_reservation(self, reservation_id: ReservationId) -> Reservation {
        Reservation {
            reservation_id,
            car_id: self.car_id,
            user_id: self.user_id,
            day: self.day,
            start_time: self.start_time,
            end_time: self.end_time,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Committed(Reservation),
    // The already-committed reservation that overlaps the request
    Overlap(Reservation),
}

#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Atomically checks `(car_id, day)` for an overlapping reservation and appends
    /// the request only if there is none.
    async fn insert_if_free(&self, request: NewReservation) -> Result<InsertOutcome, LedgerError>;

    // Ordered by start time
    async fn for_car_day(&self, car_id: CarId, day: NaiveDate)
        -> Result<Vec<Reservation>, LedgerError>;

    async fn for_car(&self, car_id: CarId) -> Result<Vec<Reservation>, LedgerError>;

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Reservation>, LedgerError>;

    // Inclusive on both ends
    async fn in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>, LedgerError>;

    async fn get(&self, reservation_id: ReservationId)
        -> Result<Option<Reservation>, LedgerError>;

    // Entire history, chronological
    async fn snapshot(&self) -> Result<Vec<Reservation>, LedgerError>;

    async fn len(&self) -> Result<usize, LedgerError>;
}

type LedgerKey = (CarId, NaiveDate);

// Reservations of one car on one day, kept sorted by start time
type DayBook = Arc<RwLock<Vec<Reservation>>>;

/// In-memory ledger. Each `(car, day)` key has its own lock, so commits for
/// different keys never wait on each other and readers only hold a lock
/// long enough to clone one day's entries.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    books: DashMap<LedgerKey, DayBook>,
    next_id: AtomicU64,
    count: AtomicUsize,
}

pub(crate) fn chronological(a: &Reservation, b: &Reservation) -> std::cmp::Ordering {
    (a.day, a.start_time, a.car_id, a.reservation_id).cmp(&(
        b.day,
        b.start_time,
        b.car_id,
        b.reservation_id,
    ))
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, key: LedgerKey) -> DayBook {
        // the shard lock is released before the day lock is taken
        self.books.entry(key).or_default().value().clone()
    }

    /// Check-then-append under the key's write lock. `persist` runs after the
    /// overlap check and before the entry becomes visible; if it fails nothing
    /// is appended.
    pub(crate) fn insert_with<F>(
        &self,
        request: NewReservation,
        persist: F,
    ) -> Result<InsertOutcome, LedgerError>
    where
        F: FnOnce(&Reservation) -> Result<(), LedgerError>,
    {
        let book = self.book((request.car_id, request.day));
        let mut entries = book.write();

        if let Some(existing) = entries
            .iter()
            .find(|r| r.overlaps(request.start_time, request.end_time))
        {
            return Ok(InsertOutcome::Overlap(existing.clone()));
        }

        let id = ReservationId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let reservation = request.into_reservation(id);
        persist(&reservation)?;

        let pos = entries.partition_point(|r| r.start_time < reservation.start_time);
        entries.insert(pos, reservation.clone());
        self.count.fetch_add(1, Ordering::SeqCst);

        Ok(InsertOutcome::Committed(reservation))
    }

    /// Re-inserts a reservation that already has an identity, e.g. when a
    /// journal is replayed. Overlaps are still refused.
    pub(crate) fn restore(&self, reservation: Reservation) -> Result<(), Reservation> {
        let book = self.book((reservation.car_id, reservation.day));
        let mut entries = book.write();

        if let Some(existing) = entries
            .iter()
            .find(|r| r.overlaps(reservation.start_time, reservation.end_time))
        {
            return Err(existing.clone());
        }

        self.next_id
            .fetch_max(reservation.reservation_id.0, Ordering::SeqCst);
        let pos = entries.partition_point(|r| r.start_time < reservation.start_time);
        entries.insert(pos, reservation);
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn collect<P>(&self, mut keep_key: P) -> Vec<Reservation>
    where
        P: FnMut(&LedgerKey) -> bool,
    {
        let books: Vec<DayBook> = self
            .books
            .iter()
            .filter(|entry| keep_key(entry.key()))
            .map(|entry| entry.value().clone())
            .collect();

        let mut out: Vec<Reservation> = books
            .iter()
            .flat_map(|book| book.read().clone())
            .collect();
        out.sort_by(chronological);
        out
    }

    pub(crate) fn for_car_day_now(&self, car_id: CarId, day: NaiveDate) -> Vec<Reservation> {
        self.books
            .get(&(car_id, day))
            .map(|book| book.value().clone())
            .map(|book| book.read().clone())
            .unwrap_or_default()
    }

    pub(crate) fn filter_now<F>(&self, mut keep: F) -> Vec<Reservation>
    where
        F: FnMut(&Reservation) -> bool,
    {
        let mut all = self.collect(|_| true);
        all.retain(|r| keep(r));
        all
    }

    pub(crate) fn range_now(&self, start: NaiveDate, end: NaiveDate) -> Vec<Reservation> {
        self.collect(|(_, day)| *day >= start && *day <= end)
    }

    pub(crate) fn len_now(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn insert_if_free(&self, request: NewReservation) -> Result<InsertOutcome, LedgerError> {
        self.insert_with(request, |_| Ok(()))
    }

    async fn for_car_day(
        &self,
        car_id: CarId,
        day: NaiveDate,
    ) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.for_car_day_now(car_id, day))
    }

    async fn for_car(&self, car_id: CarId) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.collect(|(car, _)| *car == car_id))
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.filter_now(|r| r.user_id == user_id))
    }

    async fn in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.range_now(start, end))
    }

    async fn get(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, LedgerError> {
        Ok(self
            .filter_now(|r| r.reservation_id == reservation_id)
            .into_iter()
            .next())
    }

    async fn snapshot(&self) -> Result<Vec<Reservation>, LedgerError> {
        Ok(self.collect(|_| true))
    }

    async fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.len_now())
    }
}
