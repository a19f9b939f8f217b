//! Tracing subscriber setup.
//!
//! The filter comes from `RUST_LOG` when set:
//!
//! ```bash
//! RUST_LOG=hrm_auth=debug,tower_http=debug,sqlx=warn hrm-auth
//! ```
//!
//! Sign-in failures, lockouts, refresh rejections and sweeps are logged with
//! structured fields (`user_id`, `reason`, ...). Tokens, passwords and
//! secrets are never logged.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

const DEFAULT_FILTER: &str = "hrm_auth=info,tower_http=info,sqlx=warn";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    /// Multi-line, colorized, with thread ids and line numbers.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl LogFormat {
    /// JSON in production, pretty in development, plain otherwise.
    pub fn for_config(config: &Config) -> Self {
        if config.is_production() {
            LogFormat::Json
        } else if config.is_dev() {
            LogFormat::Pretty
        } else {
            LogFormat::Plain
        }
    }
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. Returns `false` if one was already installed.
pub fn init_logging_with(format: LogFormat, default_level: &str) -> bool {
    let registry = tracing_subscriber::registry().with(filter(default_level));

    let result = match format {
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    result.is_ok()
}

/// Install the subscriber in the format suited to `config.environment`.
pub fn init_logging(config: &Config) -> bool {
    init_logging_with(LogFormat::for_config(config), DEFAULT_FILTER)
}
