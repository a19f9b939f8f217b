use std::str::FromStr;

use chrono::Duration;
use serde::Deserialize;

/// Lockout window applied after too many failed sign-ins.
pub const DEFAULT_LOCKOUT_WINDOW_MINUTES: i64 = 30;

/// Failed sign-ins tolerated before the account is locked.
pub const DEFAULT_LOCKOUT_MAX_ATTEMPTS: u32 = 5;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL (e.g. postgres://..., sqlite::memory:)
    pub database_url: String,

    /// Secret used to sign access tokens (`JWT_SECRET`)
    pub jwt_secret: String,

    /// Access token lifetime in seconds (`JWT_EXPIRES_IN`, default 30m)
    pub jwt_expires_in_secs: i64,

    /// Secret used to sign refresh tokens (`REFRESH_TOKEN_SECRET`)
    pub refresh_token_secret: String,

    /// Refresh token and session lifetime in seconds (`REFRESH_TOKEN_EXPIRES_IN`, default 7d)
    pub refresh_token_expires_in_secs: i64,

    /// Server host (default: 127.0.0.1)
    pub server_host: String,

    /// Server port (default: 3000)
    pub server_port: u16,

    /// Environment: development, production, test
    pub environment: String,

    /// Sign-in hardening and session housekeeping.
    pub security: SecurityConfig,
}

/// Security knobs for the credential verifier and session store.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Consecutive failures before the account is locked.
    pub lockout_max_attempts: u32,
    /// How long a locked account stays locked, in minutes.
    pub lockout_window_minutes: i64,
    /// Interval between expired-session sweeps, in seconds.
    pub session_sweep_interval_secs: u64,
    /// Reject sign-in for users whose email is not verified.
    pub require_email_verification: bool,
    /// Minimum accepted password length.
    pub min_password_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            lockout_max_attempts: DEFAULT_LOCKOUT_MAX_ATTEMPTS,
            lockout_window_minutes: DEFAULT_LOCKOUT_WINDOW_MINUTES,
            session_sweep_interval_secs: 3600,
            require_email_verification: false,
            min_password_length: 8,
        }
    }
}

impl SecurityConfig {
    pub fn lockout_window(&self) -> Duration {
        Duration::minutes(self.lockout_window_minutes)
    }
}

impl Config {
    /// Load configuration from environment variables (with .env support).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if present (ignore errors if missing)
        let _ = dotenvy::dotenv();

        let defaults = SecurityConfig::default();
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://hrm-auth.db?mode=rwc".to_string()),
            jwt_secret: secret_or_dev_default(
                "JWT_SECRET",
                std::env::var("JWT_SECRET").ok(),
                "hrm-dev-access-secret-change-me",
                &environment,
            )?,
            jwt_expires_in_secs: parse_duration_secs(
                &std::env::var("JWT_EXPIRES_IN").unwrap_or_else(|_| "30m".to_string()),
            )?,
            refresh_token_secret: secret_or_dev_default(
                "REFRESH_TOKEN_SECRET",
                std::env::var("REFRESH_TOKEN_SECRET").ok(),
                "hrm-dev-refresh-secret-change-me",
                &environment,
            )?,
            refresh_token_expires_in_secs: parse_duration_secs(
                &std::env::var("REFRESH_TOKEN_EXPIRES_IN").unwrap_or_else(|_| "7d".to_string()),
            )?,
            server_host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env_or("SERVER_PORT", 3000),
            environment,
            security: SecurityConfig {
                lockout_max_attempts: env_or("LOCKOUT_MAX_ATTEMPTS", defaults.lockout_max_attempts),
                lockout_window_minutes: env_or(
                    "LOCKOUT_WINDOW_MINUTES",
                    defaults.lockout_window_minutes,
                ),
                session_sweep_interval_secs: env_or(
                    "SESSION_SWEEP_INTERVAL_SECS",
                    defaults.session_sweep_interval_secs,
                ),
                require_email_verification: matches!(
                    std::env::var("REQUIRE_EMAIL_VERIFICATION")
                        .unwrap_or_default()
                        .to_lowercase()
                        .as_str(),
                    "true" | "1" | "yes"
                ),
                min_password_length: env_or("MIN_PASSWORD_LENGTH", defaults.min_password_length),
            },
        })
    }

    /// Configuration used by the test harness: in-memory SQLite, fixed secrets.
    pub fn for_tests() -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-access-secret".to_string(),
            jwt_expires_in_secs: 30 * 60,
            refresh_token_secret: "test-refresh-secret".to_string(),
            refresh_token_expires_in_secs: 7 * 24 * 60 * 60,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            environment: "test".to_string(),
            security: SecurityConfig::default(),
        }
    }

    /// Check if running in development mode.
    pub fn is_dev(&self) -> bool {
        self.environment == "development"
    }

    /// Cookies are marked `Secure` only in production.
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::seconds(self.jwt_expires_in_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_expires_in_secs)
    }

    /// Get the full server address.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// A signing secret from the environment. Outside production a missing or
/// empty value falls back to `dev_default`; in production it is an error.
fn secret_or_dev_default(
    key: &str,
    value: Option<String>,
    dev_default: &str,
    environment: &str,
) -> Result<String, String> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(secret) => Ok(secret),
        None if environment == "production" => {
            Err(format!("{} must be set when ENVIRONMENT=production", key))
        }
        None => Ok(dev_default.to_string()),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a duration such as `30m`, `7d`, `12h`, `45s` or bare seconds.
pub fn parse_duration_secs(value: &str) -> Result<i64, String> {
    let value = value.trim();
    let (digits, unit) = match value.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => value.split_at(idx),
        None => (value, ""),
    };

    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration '{}'", value))?;

    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(format!("Unknown duration unit in '{}'", value)),
    };

    Ok(amount * multiplier)
}
