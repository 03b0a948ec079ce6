//! Structured logging setup.

use crate::error::{PaymentError, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Logs go to stderr so that
/// stdout stays free for the CSV report.
pub fn init_logger(level: &str, json_format: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| PaymentError::InternalError(Box::new(e)))
}
