//! Structured logging.
//!
//! Installs a JSON `tracing` subscriber on stderr at the level chosen by the
//! `logger` module. `RUST_LOG`, when set, takes precedence so operators can
//! raise verbosity for one target without touching `LOG_LEVEL`.

use tracing_subscriber::EnvFilter;

use crate::config::LoggerConfig;
use crate::error::LoggingError;

/// Builds the filter for `config`, preferring `RUST_LOG` when present.
#[must_use]
pub fn env_filter(config: &LoggerConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`LoggingError`] if a global subscriber is already installed.
pub fn init(config: &LoggerConfig) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| LoggingError(e.to_string()))?;

    tracing::debug!(level = %config.level, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn second_init_is_rejected() {
        let config = LoggerConfig {
            level: LogLevel::Error,
        };
        // The first call may lose to another test in this binary.
        let _ = init(&config);
        assert!(init(&config).is_err());
    }
}
