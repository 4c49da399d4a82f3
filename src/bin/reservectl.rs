use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fleet_reservations::{
    logging::{init_logger, LogFormat},
    Car, CarId, Caller, Clock, EngineConfig, FixedClock, InMemoryFleet, InMemoryLedger,
    JournalLedger, LedgerStore, OperatingWindow, ReservationDesk, ReservationId, SystemClock,
    TimeOfDay, UserId,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Parser)]
#[command(name = "reservectl")]
#[command(about = "Car reservation desk: availability, bookings and fleet reports")]
struct Args {
    /// Path to TOML engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TOML file listing the fleet as [[cars]] tables
    #[arg(short, long, default_value = "fleet.toml")]
    fleet: PathBuf,

    /// Reservation journal; bookings are kept in memory only when omitted
    #[arg(short, long)]
    journal: Option<PathBuf>,

    /// Authenticated user id
    #[arg(short, long, default_value_t = 1)]
    user: u64,

    /// Act with admin rights (required for reports)
    #[arg(long)]
    admin: bool,

    /// Pretend the current date is this day (YYYY-MM-DD)
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the fleet
    Cars,
    /// Free slots for a car on a day
    Availability { car: u64, day: NaiveDate },
    /// Whether a car is booked at a given time
    Status {
        car: u64,
        day: NaiveDate,
        time: TimeOfDay,
    },
    /// Book the slot starting at `start`
    Reserve {
        car: u64,
        day: NaiveDate,
        start: TimeOfDay,
    },
    /// Reservations held by the current user
    Mine,
    /// Look up one reservation
    Show { id: u64 },
    /// Fleet dashboard
    Dashboard,
    /// Booking counts for today, this week and this month
    Summary,
    /// Per-car utilization
    Utilization {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Most active users
    Users {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Slot start times ranked by bookings
    Slots {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Revenue per day
    Revenue {
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        price: Option<f64>,
    },
    /// Reservations between two dates, inclusive
    Range { start: NaiveDate, end: NaiveDate },
    /// Ledger size and storage breaker state
    Health,
}

#[derive(Deserialize)]
struct FleetFile {
    #[serde(default)]
    cars: Vec<CarEntry>,
}

#[derive(Deserialize)]
struct CarEntry {
    car_id: u64,
    model: String,
    license_plate: String,
    open: Option<TimeOfDay>,
    close: Option<TimeOfDay>,
}

fn load_fleet(path: &Path, defaults: OperatingWindow) -> anyhow::Result<InMemoryFleet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading fleet file {}", path.display()))?;
    let file: FleetFile =
        toml::from_str(&raw).with_context(|| format!("parsing fleet file {}", path.display()))?;

    let cars = file.cars.into_iter().map(|entry| {
        let window = OperatingWindow::new(
            entry.open.unwrap_or(defaults.open),
            entry.close.unwrap_or(defaults.close),
        );
        Car::new(entry.car_id, &entry.model, &entry.license_plate).with_window(window)
    });
    Ok(InMemoryFleet::with_cars(cars))
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_logger(args.verbose, format);

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let fleet = Arc::new(load_fleet(&args.fleet, config.default_window())?);
    let store: Arc<dyn LedgerStore> = match &args.journal {
        Some(path) => Arc::new(
            JournalLedger::open(path)
                .with_context(|| format!("opening journal {}", path.display()))?,
        ),
        None => Arc::new(InMemoryLedger::new()),
    };
    let clock: Arc<dyn Clock> = match args.today {
        Some(day) => Arc::new(FixedClock::on(day)),
        None => Arc::new(SystemClock),
    };

    let desk = ReservationDesk::new(config, fleet, store, clock)?;
    let caller = Caller {
        user_id: UserId(args.user),
        is_admin: args.admin,
    };
    info!(user_id = %caller.user_id, admin = caller.is_admin, "desk ready");

    match args.command {
        Command::Cars => print(&desk.list_cars()),
        Command::Availability { car, day } => print(&desk.availability(CarId(car), day).await?),
        Command::Status { car, day, time } => {
            print(&desk.car_status(CarId(car), day, time).await?)
        }
        Command::Reserve { car, day, start } => {
            print(&desk.reserve(&caller, CarId(car), day, start).await?)
        }
        Command::Mine => print(&desk.reservations_for_user(&caller).await?),
        Command::Show { id } => print(&desk.reservation(&caller, ReservationId(id)).await?),
        Command::Dashboard => {
            let admin = caller.admin_capability()?;
            print(&desk.dashboard_summary(&admin).await?)
        }
        Command::Summary => {
            let admin = caller.admin_capability()?;
            print(&desk.booking_summary(&admin).await?)
        }
        Command::Utilization { days } => {
            let admin = caller.admin_capability()?;
            print(&desk.car_utilization(&admin, days).await?)
        }
        Command::Users { limit } => {
            let admin = caller.admin_capability()?;
            print(&desk.user_activity(&admin, limit).await?)
        }
        Command::Slots { days } => {
            let admin = caller.admin_capability()?;
            print(&desk.popular_slots(&admin, days).await?)
        }
        Command::Revenue { days, price } => {
            let admin = caller.admin_capability()?;
            print(&desk.daily_revenue(&admin, days, price).await?)
        }
        Command::Range { start, end } => {
            let admin = caller.admin_capability()?;
            print(&desk.bookings_by_date_range(&admin, start, end).await?)
        }
        Command::Health => print(&desk.health().await?),
    }
}
