// Request boundary: the operations callers see, wired over one ledger.
//
// Authentication happens before this layer. Callers arrive as an already
// verified user id plus an admin flag, and the admin flag is checked exactly
// once, when an `AdminCapability` is minted. Analytics operations take the
// capability instead of re-checking flags at every call site.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::{
    analytics::{
        AnalyticsEngine, BookingSummary, CarUtilization, DailyRevenue, DashboardSummary,
        PopularSlot, UserActivity,
    },
    availability::{AvailabilityResolver, CarStatus},
    circuit_breaker::BreakerState,
    clock::Clock,
    committer::ReservationCommitter,
    config::EngineConfig,
    error::{ConfigError, ReservationError, Result},
    fleet::CarCatalog,
    guard::GuardedLedger,
    ledger::LedgerStore,
    model::{Car, CarId, Reservation, ReservationId, TimeOfDay, UserId},
    slots::Slot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: u64) -> Self {
        Self {
            user_id: UserId(user_id),
            is_admin: false,
        }
    }

    pub fn admin(user_id: u64) -> Self {
        Self {
            user_id: UserId(user_id),
            is_admin: true,
        }
    }

    pub fn admin_capability(&self) -> Result<AdminCapability> {
        if self.is_admin {
            Ok(AdminCapability { _private: () })
        } else {
            Err(ReservationError::Forbidden("analytics"))
        }
    }
}

/// Proof that the caller passed the admin check.
#[derive(Debug)]
pub struct AdminCapability {
    _private: (),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub reservations: usize,
    pub cars: usize,
    pub ledger_breaker: BreakerState,
}

pub struct ReservationDesk {
    config: EngineConfig,
    fleet: Arc<dyn CarCatalog>,
    ledger: Arc<GuardedLedger>,
    availability: AvailabilityResolver,
    committer: ReservationCommitter,
    analytics: AnalyticsEngine,
}

impl ReservationDesk {
    pub fn new(
        config: EngineConfig,
        fleet: Arc<dyn CarCatalog>,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let slot_minutes = config.slot_duration_minutes;
        let ledger = Arc::new(GuardedLedger::new(
            store,
            config.retry.clone(),
            &config.breaker,
        ));

        Ok(Self {
            availability: AvailabilityResolver::new(fleet.clone(), ledger.clone(), slot_minutes),
            committer: ReservationCommitter::new(
                fleet.clone(),
                ledger.clone(),
                clock.clone(),
                slot_minutes,
            ),
            analytics: AnalyticsEngine::new(fleet.clone(), ledger.clone(), clock, slot_minutes),
            config,
            fleet,
            ledger,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn list_cars(&self) -> Vec<Car> {
        self.fleet.cars()
    }

    pub async fn availability(&self, car_id: CarId, day: NaiveDate) -> Result<Vec<Slot>> {
        self.availability.available_slots(car_id, day).await
    }

    pub async fn car_status(
        &self,
        car_id: CarId,
        day: NaiveDate,
        time: TimeOfDay,
    ) -> Result<CarStatus> {
        self.availability.car_status(car_id, day, time).await
    }

    // The booking is always made for the authenticated caller
    pub async fn reserve(
        &self,
        caller: &Caller,
        car_id: CarId,
        day: NaiveDate,
        start_time: TimeOfDay,
    ) -> Result<Reservation> {
        self.committer
            .commit(car_id, caller.user_id, day, start_time)
            .await
    }

    pub async fn reservations_for_user(&self, caller: &Caller) -> Result<Vec<Reservation>> {
        Ok(self.ledger.for_user(caller.user_id).await?)
    }

    // Other users' reservations are reported as missing unless the caller is an admin
    pub async fn reservation(
        &self,
        caller: &Caller,
        reservation_id: ReservationId,
    ) -> Result<Reservation> {
        match self.ledger.get(reservation_id).await? {
            Some(r) if r.user_id == caller.user_id || caller.is_admin => Ok(r),
            _ => {
                debug!(%reservation_id, user_id = %caller.user_id, "reservation lookup miss");
                Err(ReservationError::ReservationNotFound(reservation_id))
            }
        }
    }

    pub async fn dashboard_summary(&self, _: &AdminCapability) -> Result<DashboardSummary> {
        self.analytics.dashboard_summary().await
    }

    pub async fn booking_summary(&self, _: &AdminCapability) -> Result<BookingSummary> {
        self.analytics.booking_summary().await
    }

    pub async fn car_utilization(
        &self,
        _: &AdminCapability,
        window_days: Option<u32>,
    ) -> Result<Vec<CarUtilization>> {
        let days = window_days.unwrap_or(self.config.utilization_window_days);
        self.analytics.car_utilization(days).await
    }

    pub async fn user_activity(
        &self,
        _: &AdminCapability,
        limit: Option<usize>,
    ) -> Result<Vec<UserActivity>> {
        let limit = limit.unwrap_or(self.config.user_activity_limit);
        self.analytics.user_activity(limit).await
    }

    pub async fn popular_slots(
        &self,
        _: &AdminCapability,
        window_days: Option<u32>,
    ) -> Result<Vec<PopularSlot>> {
        let days = window_days.unwrap_or(self.config.popular_slots_window_days);
        self.analytics.popular_slots(days).await
    }

    pub async fn daily_revenue(
        &self,
        _: &AdminCapability,
        window_days: Option<u32>,
        price_per_booking: Option<f64>,
    ) -> Result<Vec<DailyRevenue>> {
        let days = window_days.unwrap_or(self.config.revenue_window_days);
        let price = price_per_booking.unwrap_or(self.config.price_per_booking);
        self.analytics.daily_revenue(days, price).await
    }

    pub async fn bookings_by_date_range(
        &self,
        _: &AdminCapability,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>> {
        self.analytics.bookings_by_date_range(start, end).await
    }

    pub async fn health(&self) -> Result<Health> {
        Ok(Health {
            reservations: self.ledger.len().await?,
            cars: self.fleet.len(),
            ledger_breaker: self.ledger.breaker_state(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock, error::ErrorKind, fleet::InMemoryFleet, ledger::InMemoryLedger,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn t(h: u16) -> TimeOfDay {
        TimeOfDay::hm(h, 0).unwrap()
    }

    fn desk() -> ReservationDesk {
        ReservationDesk::new(
            EngineConfig::default(),
            Arc::new(InMemoryFleet::with_cars([
                Car::new(1, "Corolla", "AB-123"),
                Car::new(2, "Model 3", "EV-003"),
            ])),
            Arc::new(InMemoryLedger::new()),
            Arc::new(FixedClock::on(today())),
        )
        .unwrap()
    }

    #[test]
    fn test_admin_capability_is_gated() {
        assert!(Caller::admin(1).admin_capability().is_ok());
        let err = Caller::user(1).admin_capability().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let config = EngineConfig {
            slot_duration_minutes: 0,
            ..Default::default()
        };
        let result = ReservationDesk::new(
            config,
            Arc::new(InMemoryFleet::new()),
            Arc::new(InMemoryLedger::new()),
            Arc::new(FixedClock::on(today())),
        );
        assert!(matches!(result, Err(ConfigError::ZeroSlotDuration)));
    }

    #[tokio::test]
    async fn test_reserve_and_lookup_as_owner() {
        let desk = desk();
        let alice = Caller::user(10);
        let bob = Caller::user(11);

        let r = desk.reserve(&alice, CarId(1), today(), t(10)).await.unwrap();
        assert_eq!(r.user_id, alice.user_id);

        assert_eq!(desk.reservations_for_user(&alice).await.unwrap(), vec![r.clone()]);
        assert!(desk.reservations_for_user(&bob).await.unwrap().is_empty());

        assert_eq!(desk.reservation(&alice, r.reservation_id).await.unwrap(), r);
        let err = desk.reservation(&bob, r.reservation_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(desk
            .reservation(&Caller::admin(1), r.reservation_id)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_analytics_use_configured_defaults() {
        let desk = desk();
        let admin = Caller::admin(1).admin_capability().unwrap();
        desk.reserve(&Caller::user(3), CarId(2), today(), t(8))
            .await
            .unwrap();

        let revenue = desk.daily_revenue(&admin, None, None).await.unwrap();
        assert_eq!(revenue.len(), 7);
        assert_eq!(revenue.last().unwrap().revenue, 50.0);

        let util = desk.car_utilization(&admin, None).await.unwrap();
        assert_eq!(util[0].car_id, CarId(2));
        // 1 of 5 slots a day over 30 days
        assert_eq!(util[0].utilization_percentage, 0.7);

        let health = desk.health().await.unwrap();
        assert_eq!(
            health,
            Health {
                reservations: 1,
                cars: 2,
                ledger_breaker: BreakerState::Closed,
            }
        );
    }
}
