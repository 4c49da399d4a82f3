use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

// RUST_LOG wins over the verbosity flag when set
pub fn init_logger(verbose: bool, format: LogFormat) {
    let default_directive = if verbose {
        "fleet_reservations=debug,reservectl=debug,info"
    } else {
        "fleet_reservations=info,reservectl=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    // try_init so a second call (tests, embedding) is a no-op
    let _ = match format {
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    };
}
