// Reservation committer: the single write path into the ledger.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::{
    clock::Clock,
    error::{ReservationError, Result, ValidationError},
    fleet::CarCatalog,
    guard::GuardedLedger,
    ledger::{InsertOutcome, NewReservation},
    model::{CarId, Reservation, TimeOfDay, UserId},
    slots::SlotGenerator,
};

pub struct ReservationCommitter {
    fleet: Arc<dyn CarCatalog>,
    ledger: Arc<GuardedLedger>,
    clock: Arc<dyn Clock>,
    slot_minutes: u16,
}

impl ReservationCommitter {
    pub fn new(
        fleet: Arc<dyn CarCatalog>,
        ledger: Arc<GuardedLedger>,
        clock: Arc<dyn Clock>,
        slot_minutes: u16,
    ) -> Self {
        Self {
            fleet,
            ledger,
            clock,
            slot_minutes,
        }
    }

    /// Books the slot of `car_id` starting at `start_time` on `day`.
    ///
    /// The end time is derived from the slot duration and `start_time` must be
    /// one of the car's generated slot boundaries. The overlap check happens
    /// inside the ledger's atomic insert, so a slot that looked free to an
    /// earlier availability read can still come back as `Conflict`.
    pub async fn commit(
        &self,
        car_id: CarId,
        user_id: UserId,
        day: NaiveDate,
        start_time: TimeOfDay,
    ) -> Result<Reservation> {
        let car = self
            .fleet
            .car(car_id)
            .ok_or(ReservationError::CarNotFound(car_id))?;

        let today = self.clock.today();
        if day < today {
            return Err(ValidationError::PastDate { day, today }.into());
        }

        let generator = SlotGenerator::for_car(&car, self.slot_minutes)?;
        let slot = generator
            .slot_at(day, start_time)
            .ok_or(ValidationError::MisalignedSlot {
                car_id,
                start: start_time,
            })?;

        let request = NewReservation {
            car_id,
            user_id,
            day,
            start_time: slot.start_time,
            end_time: slot.end_time,
            created_at: self.clock.now(),
        };

        match self.ledger.insert_if_free(request).await? {
            InsertOutcome::Committed(reservation) => {
                info!(
                    reservation_id = %reservation.reservation_id,
                    %car_id,
                    %user_id,
                    %day,
                    start = %slot.start_time,
                    "reservation committed"
                );
                Ok(reservation)
            }
            InsertOutcome::Overlap(existing) => {
                warn!(
                    %car_id,
                    %day,
                    start = %slot.start_time,
                    held_by = %existing.reservation_id,
                    "reservation conflict"
                );
                Err(ReservationError::Conflict {
                    car_id,
                    day,
                    start: slot.start_time,
                    end: slot.end_time,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        availability::AvailabilityResolver,
        circuit_breaker::BreakerConfig,
        clock::FixedClock,
        error::ErrorKind,
        fleet::InMemoryFleet,
        guard::tests::FlakyLedger,
        ledger::{InMemoryLedger, LedgerStore},
        model::{Car, OperatingWindow},
        retry::RetryConfig,
    };
    use futures::future::join_all;

    fn t(h: u16) -> TimeOfDay {
        TimeOfDay::hm(h, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn fleet() -> Arc<InMemoryFleet> {
        Arc::new(InMemoryFleet::with_cars([
            Car::new(1, "Corolla", "AB-123").with_window(OperatingWindow::new(t(9), t(17))),
            Car::new(2, "Model 3", "EV-003"),
        ]))
    }

    fn engine(
        store: Arc<dyn LedgerStore>,
        retries: u32,
    ) -> (ReservationCommitter, AvailabilityResolver) {
        let fleet = fleet();
        let ledger = Arc::new(GuardedLedger::new(
            store,
            RetryConfig::no_delay(retries),
            &BreakerConfig::default(),
        ));
        let clock = Arc::new(FixedClock::on(today()));
        (
            ReservationCommitter::new(fleet.clone(), ledger.clone(), clock, 120),
            AvailabilityResolver::new(fleet, ledger, 120),
        )
    }

    #[tokio::test]
    async fn test_commit_derives_end_and_identity() {
        let (committer, _) = engine(Arc::new(InMemoryLedger::new()), 0);
        let r = committer
            .commit(CarId(1), UserId(7), today(), t(11))
            .await
            .unwrap();

        assert_eq!(r.end_time, t(13));
        assert_eq!(r.user_id, UserId(7));
        assert_eq!(r.day, today());
        assert_eq!(r.created_at.date_naive(), today());

        let next = committer
            .commit(CarId(1), UserId(7), today(), t(13))
            .await
            .unwrap();
        assert!(next.reservation_id > r.reservation_id);
    }

    #[tokio::test]
    async fn test_committed_slot_disappears_from_availability() {
        let (committer, resolver) = engine(Arc::new(InMemoryLedger::new()), 0);
        let day = today().succ_opt().unwrap();

        let free = resolver.available_slots(CarId(1), day).await.unwrap();
        let chosen = free[1];
        committer
            .commit(CarId(1), UserId(1), day, chosen.start_time)
            .await
            .unwrap();

        let after = resolver.available_slots(CarId(1), day).await.unwrap();
        assert!(!after.contains(&chosen));
        assert_eq!(after.len(), free.len() - 1);
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let (committer, _) = engine(Arc::new(InMemoryLedger::new()), 0);
        let yesterday = today().pred_opt().unwrap();

        let err = committer
            .commit(CarId(1), UserId(1), yesterday, t(9))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReservationError::Validation(ValidationError::PastDate { .. })
        ));

        // off-boundary, before opening, and a start that would run past closing
        for start in [TimeOfDay::hm(10, 0).unwrap(), t(8), t(17), TimeOfDay::hm(9, 30).unwrap()] {
            let err = committer
                .commit(CarId(1), UserId(1), today(), start)
                .await
                .unwrap_err();
            assert!(
                matches!(err, ReservationError::Validation(ValidationError::MisalignedSlot { .. })),
                "{start} should be rejected, got {err:?}"
            );
        }

        let err = committer
            .commit(CarId(9), UserId(1), today(), t(9))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_second_booking_of_same_slot_conflicts() {
        let (committer, _) = engine(Arc::new(InMemoryLedger::new()), 0);
        committer
            .commit(CarId(2), UserId(1), today(), t(8))
            .await
            .unwrap();
        let err = committer
            .commit(CarId(2), UserId(2), today(), t(8))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_commits_exactly_one_wins() {
        let (committer, _) = engine(Arc::new(InMemoryLedger::new()), 0);
        let committer = Arc::new(committer);
        let n = 50;

        let attempts = (0..n).map(|user| {
            let committer = committer.clone();
            tokio::spawn(async move {
                committer
                    .commit(CarId(1), UserId(user), today(), t(11))
                    .await
            })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let won = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Conflict))
            .count();
        assert_eq!(won, 1);
        assert_eq!(conflicts, n as usize - 1);
    }

    #[tokio::test]
    async fn test_storage_outage_is_retried_then_surfaced() {
        let flaky = Arc::new(FlakyLedger::failing(2));
        let (committer, _) = engine(flaky.clone(), 3);
        assert!(committer
            .commit(CarId(1), UserId(1), today(), t(9))
            .await
            .is_ok());

        let dead = Arc::new(FlakyLedger::failing(usize::MAX));
        let (committer, _) = engine(dead, 2);
        let err = committer
            .commit(CarId(1), UserId(1), today(), t(9))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
