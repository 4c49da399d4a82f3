// Storage-access layer: every ledger call made by the engine goes through here,
// picking up bounded retries for transient failures and the circuit breaker.

use std::{future::Future, sync::Arc};

use chrono::NaiveDate;

use crate::{
    circuit_breaker::{BreakerConfig, BreakerState, CircuitBreaker},
    ledger::{InsertOutcome, LedgerError, LedgerStore, NewReservation},
    model::{CarId, Reservation, ReservationId, UserId},
    retry::{with_retry, RetryConfig},
};

pub struct GuardedLedger {
    store: Arc<dyn LedgerStore>,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl GuardedLedger {
    pub fn new(store: Arc<dyn LedgerStore>, retry: RetryConfig, breaker: &BreakerConfig) -> Self {
        Self {
            store,
            retry,
            breaker: CircuitBreaker::new(breaker),
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    async fn guarded<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        if !self.breaker.should_allow_call() {
            return Err(LedgerError::CircuitOpen(operation));
        }

        let result = with_retry(&self.retry, operation, op).await;
        match &result {
            Ok(_) => self.breaker.success(),
            Err(LedgerError::Unavailable(_)) | Err(LedgerError::Io(_)) => self.breaker.fail(),
            Err(_) => {}
        }
        result
    }

    // A retried insert is safe: the overlap check runs again on every attempt
    pub async fn insert_if_free(
        &self,
        request: NewReservation,
    ) -> Result<InsertOutcome, LedgerError> {
        let store = &*self.store;
        self.guarded("insert_if_free", move || {
            let request = request.clone();
            async move { store.insert_if_free(request).await }
        })
        .await
    }

    pub async fn for_car_day(
        &self,
        car_id: CarId,
        day: NaiveDate,
    ) -> Result<Vec<Reservation>, LedgerError> {
        let store = &*self.store;
        self.guarded("for_car_day", move || store.for_car_day(car_id, day))
            .await
    }

    pub async fn for_car(&self, car_id: CarId) -> Result<Vec<Reservation>, LedgerError> {
        let store = &*self.store;
        self.guarded("for_car", move || store.for_car(car_id)).await
    }

    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<Reservation>, LedgerError> {
        let store = &*self.store;
        self.guarded("for_user", move || store.for_user(user_id)).await
    }

    pub async fn in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>, LedgerError> {
        let store = &*self.store;
        self.guarded("in_range", move || store.in_range(start, end))
            .await
    }

    pub async fn get(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Reservation>, LedgerError> {
        let store = &*self.store;
        self.guarded("get", move || store.get(reservation_id)).await
    }

    pub async fn snapshot(&self) -> Result<Vec<Reservation>, LedgerError> {
        let store = &*self.store;
        self.guarded("snapshot", move || store.snapshot()).await
    }

    pub async fn len(&self) -> Result<usize, LedgerError> {
        let store = &*self.store;
        self.guarded("len", move || store.len()).await
    }
}
