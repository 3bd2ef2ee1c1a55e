//! Logging setup.

use crate::config::LoggingConfig;

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over [`LoggingConfig::filter`]. Calling this
/// more than once is harmless: later calls leave the first subscriber in
/// place and return `false`.
#[cfg(feature = "logging")]
pub fn init_logging(config: &LoggingConfig) -> bool {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(config.ansi))
        .try_init()
        .is_ok()
}

/// Without the `logging` feature the embedding application owns the
/// subscriber; this is a no-op.
#[cfg(not(feature = "logging"))]
pub fn init_logging(_config: &LoggingConfig) -> bool {
    false
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_noop() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
