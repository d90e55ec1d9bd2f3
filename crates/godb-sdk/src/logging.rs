//! `tracing` subscriber bootstrap.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{SdkError, SdkResult};

/// Install a global fmt subscriber filtered by `config.level`.
///
/// `GODB_LOG`, when set, overrides the configured level. Returns `false` when
/// a global subscriber was already installed, which is not an error.
pub fn init(config: &LoggingConfig) -> SdkResult<bool> {
    let filter = build_filter(config)?;
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_ansi(config.ansi))
        .try_init()
        .is_ok();
    Ok(installed)
}

fn build_filter(config: &LoggingConfig) -> SdkResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env("GODB_LOG") {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| SdkError::InvalidConfig(format!("logging.level {:?}: {e}", config.level)))
}
