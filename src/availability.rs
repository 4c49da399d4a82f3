// Availability resolver: candidate slots minus the ledger's reservations for (car, day).
// Results are a snapshot; the committer re-checks at commit time.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::{
    error::{ReservationError, Result},
    fleet::CarCatalog,
    guard::GuardedLedger,
    model::{Car, CarId, ReservationId, TimeOfDay},
    slots::{Slot, SlotGenerator},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CarStatus {
    Available {
        next_booking: Option<UpcomingBooking>,
    },
    Booked {
        reservation_id: ReservationId,
        until: TimeOfDay,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingBooking {
    pub day: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

pub struct AvailabilityResolver {
    fleet: Arc<dyn CarCatalog>,
    ledger: Arc<GuardedLedger>,
    slot_minutes: u16,
}

impl AvailabilityResolver {
    pub fn new(fleet: Arc<dyn CarCatalog>, ledger: Arc<GuardedLedger>, slot_minutes: u16) -> Self {
        Self {
            fleet,
            ledger,
            slot_minutes,
        }
    }

    fn car(&self, car_id: CarId) -> Result<Car> {
        self.fleet
            .car(car_id)
            .ok_or(ReservationError::CarNotFound(car_id))
    }

    pub async fn available_slots(&self, car_id: CarId, day: NaiveDate) -> Result<Vec<Slot>> {
        let car = self.car(car_id)?;
        let generator = SlotGenerator::for_car(&car, self.slot_minutes)?;
        let booked = self.ledger.for_car_day(car_id, day).await?;

        let free: Vec<Slot> = generator
            .generate(day)
            .filter(|slot| {
                !booked
                    .iter()
                    .any(|r| slot.overlaps(r.start_time, r.end_time))
            })
            .collect();

        debug!(
            %car_id,
            %day,
            booked = booked.len(),
            free = free.len(),
            "resolved availability"
        );
        Ok(free)
    }

    /// Whether the car is in use at `time` on `day`, and if not, its next booking.
    pub async fn car_status(
        &self,
        car_id: CarId,
        day: NaiveDate,
        time: TimeOfDay,
    ) -> Result<CarStatus> {
        self.car(car_id)?;
        let history = self.ledger.for_car(car_id).await?;

        if let Some(current) = history
            .iter()
            .find(|r| r.day == day && r.start_time <= time && time < r.end_time)
        {
            return Ok(CarStatus::Booked {
                reservation_id: current.reservation_id,
                until: current.end_time,
            });
        }

        // history is chronological, so the first later entry is the next one
        let next_booking = history
            .iter()
            .find(|r| (r.day, r.start_time) > (day, time))
            .map(|r| UpcomingBooking {
                day: r.day,
                start_time: r.start_time,
                end_time: r.end_time,
            });

        Ok(CarStatus::Available { next_booking })
    }
}
