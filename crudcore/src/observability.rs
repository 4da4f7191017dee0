//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Install a JSON `tracing` subscriber filtered by `service.log_level`
///
/// `RUST_LOG`-style directives are accepted; an unparsable level falls back
/// to `info`. Installing twice is an error.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| crate::error::Error::Internal(format!("failed to install tracing subscriber: {e}")))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// Log the end of tracing (no-op)
///
/// The fmt subscriber writes each event as it happens and keeps nothing to
/// flush; the global subscriber stays installed.
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown (no-op)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let mut config = Config::default();
        config.service.log_level = "not a level ((".to_string();

        // the first call may race other tests' subscribers; only the second is certain to fail
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn test_shutdown_keeps_global_subscriber() {
        let config = Config::default();
        let _ = init_tracing(&config);
        shutdown_tracing();
        assert!(init_tracing(&config).is_err());
    }
}
