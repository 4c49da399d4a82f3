// Analytics aggregation over the reservation ledger.
//
// Every query is read-only: it takes a snapshot (or a date-range slice) of the
// ledger and folds it into a report. An empty ledger gives zero-valued reports,
// never an error.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use chrono::{Datelike, Days, Duration, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::{
    clock::Clock,
    error::{Result, ValidationError},
    fleet::CarCatalog,
    guard::GuardedLedger,
    model::{Car, CarId, Reservation, TimeOfDay, UserId},
    slots::SlotGenerator,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_bookings: usize,
    pub active_users: usize,
    pub total_cars: usize,
    pub today_bookings: usize,
    pub upcoming_bookings: usize,
    pub popular_car: Option<PopularCar>,
    pub busiest_time: Option<TimeOfDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularCar {
    pub car_id: CarId,
    // "Model (PLATE)" when the car is still in the catalog
    pub label: Option<String>,
    pub total_bookings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingSummary {
    pub total_bookings: usize,
    pub total_users: usize,
    pub total_cars: usize,
    pub bookings_today: usize,
    pub bookings_this_week: usize,
    pub bookings_this_month: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarUtilization {
    pub car_id: CarId,
    pub model: String,
    pub license_plate: String,
    pub total_bookings: usize,
    pub utilization_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserActivity {
    pub user_id: UserId,
    pub total_bookings: usize,
    pub last_booking_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopularSlot {
    pub start_time: TimeOfDay,
    pub booking_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub total_bookings: usize,
    pub revenue: f64,
}

/// Longest trailing window a report may ask for, about ten years.
pub const MAX_WINDOW_DAYS: u32 = 3660;

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// The `days` calendar days ending with `today`. Zero days is no window at all.
    pub fn trailing(
        today: NaiveDate,
        days: u32,
    ) -> std::result::Result<Option<Self>, ValidationError> {
        let too_long = || ValidationError::InvalidParameter {
            name: "window_days",
            message: format!("a {days} day window is not supported (limit {MAX_WINDOW_DAYS})"),
        };
        if days > MAX_WINDOW_DAYS {
            return Err(too_long());
        }
        let Some(back) = days.checked_sub(1) else {
            return Ok(None);
        };
        let start = today
            .checked_sub_days(Days::new(u64::from(back)))
            .ok_or_else(too_long)?;
        Ok(Some(Self { start, end: today }))
    }

    // Monday through Sunday of the week containing `day`
    pub fn week_of(day: NaiveDate) -> Self {
        let start = day - Duration::days(day.weekday().num_days_from_monday() as i64);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn month_of(day: NaiveDate) -> Self {
        let start = day.with_day(1).unwrap_or(day);
        let next_month = if start.month() == 12 {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
        };
        let end = next_month
            .and_then(|d| d.pred_opt())
            .unwrap_or(day);
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn len_days(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take(self.len_days())
    }
}

// Percentage rounded half away from zero to one decimal place
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 * 100.0 / whole as f64;
    (pct * 10.0).round() / 10.0
}

// Highest count wins; ties go to the smallest key
fn most_frequent<K: Ord + Copy>(counts: &HashMap<K, usize>) -> Option<(K, usize)> {
    counts
        .iter()
        .map(|(k, c)| (*k, *c))
        .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then_with(|| kb.cmp(ka)))
}

pub fn dashboard_summary(
    reservations: &[Reservation],
    cars: &[Car],
    today: NaiveDate,
) -> DashboardSummary {
    let mut per_car: HashMap<CarId, usize> = HashMap::new();
    let mut per_start: HashMap<TimeOfDay, usize> = HashMap::new();
    let mut users = HashSet::new();
    let mut today_bookings = 0;
    let mut upcoming_bookings = 0;

    for r in reservations {
        *per_car.entry(r.car_id).or_default() += 1;
        *per_start.entry(r.start_time).or_default() += 1;
        users.insert(r.user_id);
        if r.day == today {
            today_bookings += 1;
        }
        if r.day >= today {
            upcoming_bookings += 1;
        }
    }

    let popular_car = most_frequent(&per_car).map(|(car_id, total_bookings)| PopularCar {
        car_id,
        label: cars.iter().find(|c| c.car_id == car_id).map(Car::label),
        total_bookings,
    });

    DashboardSummary {
        total_bookings: reservations.len(),
        active_users: users.len(),
        total_cars: cars.len(),
        today_bookings,
        upcoming_bookings,
        popular_car,
        busiest_time: most_frequent(&per_start).map(|(time, _)| time),
    }
}

pub fn booking_summary(
    reservations: &[Reservation],
    total_cars: usize,
    today: NaiveDate,
) -> BookingSummary {
    let week = DateWindow::week_of(today);
    let month = DateWindow::month_of(today);
    let count = |window: &DateWindow| {
        reservations
            .iter()
            .filter(|r| window.contains(r.day))
            .count()
    };

    BookingSummary {
        total_bookings: reservations.len(),
        total_users: reservations
            .iter()
            .map(|r| r.user_id)
            .collect::<HashSet<_>>()
            .len(),
        total_cars,
        bookings_today: reservations.iter().filter(|r| r.day == today).count(),
        bookings_this_week: count(&week),
        bookings_this_month: count(&month),
    }
}

/// Per-car utilization over `window`. `reservations` must already be limited
/// to the window. Each reservation occupies exactly one slot.
pub fn car_utilization(
    reservations: &[Reservation],
    cars: &[Car],
    window: Option<DateWindow>,
    slot_minutes: u16,
) -> Result<Vec<CarUtilization>> {
    let days = window.map(|w| w.len_days()).unwrap_or(0);
    let mut per_car: HashMap<CarId, usize> = HashMap::new();
    for r in reservations {
        *per_car.entry(r.car_id).or_default() += 1;
    }

    let mut out = Vec::with_capacity(cars.len());
    for car in cars {
        let total_bookings = per_car.get(&car.car_id).copied().unwrap_or(0);
        let capacity = SlotGenerator::for_car(car, slot_minutes)?.slots_per_day() * days;
        out.push(CarUtilization {
            car_id: car.car_id,
            model: car.model.clone(),
            license_plate: car.license_plate.clone(),
            total_bookings,
            utilization_percentage: percentage(total_bookings, capacity),
        });
    }

    out.sort_by(|a, b| {
        b.total_bookings
            .cmp(&a.total_bookings)
            .then_with(|| a.car_id.cmp(&b.car_id))
    });
    Ok(out)
}

pub fn user_activity(reservations: &[Reservation], limit: usize) -> Vec<UserActivity> {
    let mut per_user: BTreeMap<UserId, (usize, NaiveDate)> = BTreeMap::new();
    for r in reservations {
        let entry = per_user.entry(r.user_id).or_insert((0, r.day));
        entry.0 += 1;
        entry.1 = entry.1.max(r.day);
    }

    let mut out: Vec<UserActivity> = per_user
        .into_iter()
        .map(|(user_id, (total_bookings, last_booking_date))| UserActivity {
            user_id,
            total_bookings,
            last_booking_date,
        })
        .collect();
    // stable sort keeps the BTreeMap's user id order among equal counts
    out.sort_by(|a, b| b.total_bookings.cmp(&a.total_bookings));
    out.truncate(limit);
    out
}

pub fn popular_slots(reservations: &[Reservation]) -> Vec<PopularSlot> {
    let mut per_start: BTreeMap<TimeOfDay, usize> = BTreeMap::new();
    for r in reservations {
        *per_start.entry(r.start_time).or_default() += 1;
    }

    let mut out: Vec<PopularSlot> = per_start
        .into_iter()
        .map(|(start_time, booking_count)| PopularSlot {
            start_time,
            booking_count,
        })
        .collect();
    out.sort_by(|a, b| b.booking_count.cmp(&a.booking_count));
    out
}

/// One entry per day of the window, oldest first. Days without bookings
/// are present with zero revenue.
pub fn daily_revenue(
    reservations: &[Reservation],
    window: Option<DateWindow>,
    price_per_booking: f64,
) -> Vec<DailyRevenue> {
    let Some(window) = window else {
        return Vec::new();
    };

    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for r in reservations.iter().filter(|r| window.contains(r.day)) {
        *per_day.entry(r.day).or_default() += 1;
    }

    window
        .days()
        .map(|date| {
            let total_bookings = per_day.get(&date).copied().unwrap_or(0);
            DailyRevenue {
                date,
                total_bookings,
                revenue: total_bookings as f64 * price_per_booking,
            }
        })
        .collect()
}

pub struct AnalyticsEngine {
    fleet: Arc<dyn CarCatalog>,
    ledger: Arc<GuardedLedger>,
    clock: Arc<dyn Clock>,
    slot_minutes: u16,
}

impl AnalyticsEngine {
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

    async fn window_slice(&self, days: u32) -> Result<(Option<DateWindow>, Vec<Reservation>)> {
        let window = DateWindow::trailing(self.clock.today(), days)?;
        let reservations = match window {
            Some(w) => self.ledger.in_range(w.start, w.end).await?,
            None => Vec::new(),
        };
        Ok((window, reservations))
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let reservations = self.ledger.snapshot().await?;
        let summary = dashboard_summary(&reservations, &self.fleet.cars(), self.clock.today());
        debug!(total = summary.total_bookings, "dashboard summary");
        Ok(summary)
    }

    pub async fn booking_summary(&self) -> Result<BookingSummary> {
        let reservations = self.ledger.snapshot().await?;
        Ok(booking_summary(
            &reservations,
            self.fleet.len(),
            self.clock.today(),
        ))
    }

    pub async fn car_utilization(&self, window_days: u32) -> Result<Vec<CarUtilization>> {
        let (window, reservations) = self.window_slice(window_days).await?;
        car_utilization(&reservations, &self.fleet.cars(), window, self.slot_minutes)
    }

    pub async fn user_activity(&self, limit: usize) -> Result<Vec<UserActivity>> {
        let reservations = self.ledger.snapshot().await?;
        Ok(user_activity(&reservations, limit))
    }

    pub async fn popular_slots(&self, window_days: u32) -> Result<Vec<PopularSlot>> {
        let (_, reservations) = self.window_slice(window_days).await?;
        Ok(popular_slots(&reservations))
    }

    pub async fn daily_revenue(
        &self,
        window_days: u32,
        price_per_booking: f64,
    ) -> Result<Vec<DailyRevenue>> {
        if !price_per_booking.is_finite() || price_per_booking < 0.0 {
            return Err(ValidationError::InvalidParameter {
                name: "price_per_booking",
                message: format!("{price_per_booking} is not a valid price"),
            }
            .into());
        }
        let (window, reservations) = self.window_slice(window_days).await?;
        Ok(daily_revenue(&reservations, window, price_per_booking))
    }

    pub async fn bookings_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>> {
        if end < start {
            return Err(ValidationError::InvalidDateRange { start, end }.into());
        }
        Ok(self.ledger.in_range(start, end).await?)
    }
}
