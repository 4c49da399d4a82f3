use chrono::{DateTime, Local, NaiveDate, Utc};
use parking_lot::RwLock;

// Source of "today" and commit timestamps
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    // Calendar days follow the local timezone of the service
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

// Settable clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn on(day: NaiveDate) -> Self {
        let noon = day
            .and_hms_opt(12, 0, 0)
            .unwrap_or_default()
            .and_utc();
        Self::at(noon)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }

    fn today(&self) -> NaiveDate {
        self.now.read().date_naive()
    }
}
