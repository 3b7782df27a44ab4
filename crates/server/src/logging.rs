use routeslot_core::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "warn,routeslot_core=info,server=info,routeslot_server=info,engine=info";

/// Builds the filter: `RUST_LOG` when set, otherwise crate-scoped defaults at
/// `logging.level`.
#[must_use]
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(level) if level == "debug" || level == "trace" => EnvFilter::new(format!(
            "warn,routeslot_core={level},server={level},routeslot_server={level},engine={level}"
        )),
        Ok(_) => EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
        Err(_) if config.level != "info" => EnvFilter::new(format!(
            "warn,routeslot_core={0},server={0},routeslot_server={0},engine={0}",
            config.level
        )),
        Err(_) => EnvFilter::new(DEFAULT_DIRECTIVES),
    }
}

/// Installs the global subscriber: JSON lines or pretty output per `logging.format`.
pub fn init_logging(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false),
            )
            .init();
    }
}
