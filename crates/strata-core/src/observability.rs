//! Observability infrastructure for Strata.
//!
//! Structured logging with consistent fields across all Strata components.
//! Control planes log the ids they act on (`plan_id`, `node_id`, `channel`)
//! as structured fields, never interpolated into the message.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Human-readable logs (for development).
    #[default]
    Text,
}

/// Initializes the logging subsystem.
///
/// Call once at process startup; subsequent calls are no-ops. Log levels are
/// controlled by `RUST_LOG` (defaulting to `info`).
///
/// # Example
///
/// ```rust
/// use strata_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Text);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_current_span(false))
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging(LogFormat::Text);
        init_logging(LogFormat::Json);
    }
}
