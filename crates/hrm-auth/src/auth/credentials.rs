//! Email + password sign-in with failed-attempt tracking and lockout.

use std::fmt;

use axum::http::StatusCode;
use chrono::{NaiveDateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::auth::claims::RoleClaims;
use crate::auth::jwt::TokenIssuer;
use crate::auth::lockout::{self, FailedAttempt, LockoutPolicy};
use crate::auth::password;
use crate::auth::rbac::RbacService;
use crate::auth::session::{self, ClientInfo};
use crate::config::Config;
use crate::error::HrmError;
use crate::models::user;

/// Why a sign-in was refused. These are expected outcomes, not faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInRejection {
    /// Unknown email or wrong password. `remaining_attempts` is only known
    /// when the account exists.
    InvalidCredentials { remaining_attempts: Option<u32> },
    Deactivated,
    Locked {
        locked_until: NaiveDateTime,
        remaining_minutes: i64,
    },
    EmailNotVerified,
}

impl SignInRejection {
    fn locked(locked_until: NaiveDateTime, now: NaiveDateTime) -> Self {
        SignInRejection::Locked {
            locked_until,
            remaining_minutes: lockout::remaining_minutes(locked_until, now),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SignInRejection::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
            SignInRejection::Deactivated => StatusCode::FORBIDDEN,
            SignInRejection::Locked { .. } => StatusCode::LOCKED,
            SignInRejection::EmailNotVerified => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            SignInRejection::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            SignInRejection::Deactivated => "ACCOUNT_DEACTIVATED",
            SignInRejection::Locked { .. } => "ACCOUNT_LOCKED",
            SignInRejection::EmailNotVerified => "EMAIL_NOT_VERIFIED",
        }
    }

    pub fn account_locked(&self) -> Option<bool> {
        match self {
            SignInRejection::InvalidCredentials {
                remaining_attempts: Some(_),
            } => Some(false),
            SignInRejection::Locked { .. } => Some(true),
            _ => None,
        }
    }

    pub fn remaining_attempts(&self) -> Option<u32> {
        match self {
            SignInRejection::InvalidCredentials { remaining_attempts } => *remaining_attempts,
            SignInRejection::Locked { .. } => Some(0),
            _ => None,
        }
    }

    pub fn locked_until(&self) -> Option<NaiveDateTime> {
        match self {
            SignInRejection::Locked { locked_until, .. } => Some(*locked_until),
            _ => None,
        }
    }

    pub fn email_verification_required(&self) -> Option<bool> {
        match self {
            SignInRejection::EmailNotVerified => Some(true),
            _ => None,
        }
    }
}

impl fmt::Display for SignInRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignInRejection::InvalidCredentials { .. } => f.write_str("Invalid email or password"),
            SignInRejection::Deactivated => f.write_str("Account is deactivated"),
            SignInRejection::Locked {
                remaining_minutes, ..
            } => write!(
                f,
                "Account is locked. Try again in {} minute(s).",
                remaining_minutes
            ),
            SignInRejection::EmailNotVerified => {
                f.write_str("Please verify your email address before signing in")
            }
        }
    }
}

impl From<SignInRejection> for HrmError {
    fn from(rejection: SignInRejection) -> Self {
        HrmError::SignInRejected(rejection)
    }
}

/// Everything a client needs after a successful sign-in.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    pub session_expires_at: NaiveDateTime,
    pub user: user::Model,
    pub role: Option<RoleClaims>,
}

#[derive(Debug, Clone)]
pub enum SignInOutcome {
    Authenticated(Box<AuthenticatedSession>),
    Rejected(SignInRejection),
}

impl SignInOutcome {
    /// Turn a rejection into an [`HrmError`] for the HTTP layer.
    pub fn into_result(self) -> Result<AuthenticatedSession, HrmError> {
        match self {
            SignInOutcome::Authenticated(session) => Ok(*session),
            SignInOutcome::Rejected(rejection) => Err(rejection.into()),
        }
    }
}

/// Emails are compared trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check an email/password pair and open a session on success.
///
/// Business failures come back as [`SignInOutcome::Rejected`]; `Err` is
/// reserved for database, hashing and token failures.
pub async fn sign_in(
    db: &DatabaseConnection,
    config: &Config,
    issuer: &TokenIssuer,
    rbac: &RbacService,
    email: &str,
    password: &str,
    client: &ClientInfo,
) -> Result<SignInOutcome, HrmError> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(HrmError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let found = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(db)
        .await?;

    let Some(mut account) = found else {
        password::verify_dummy_async(password.to_string()).await;
        tracing::info!(reason = "unknown_email", "sign-in rejected");
        return Ok(SignInOutcome::Rejected(
            SignInRejection::InvalidCredentials {
                remaining_attempts: None,
            },
        ));
    };

    if !account.is_active {
        tracing::info!(user_id = account.id, reason = "deactivated", "sign-in rejected");
        return Ok(SignInOutcome::Rejected(SignInRejection::Deactivated));
    }

    let now = Utc::now().naive_utc();
    if let Some(until) = account.account_locked_until {
        if now < until {
            tracing::info!(user_id = account.id, reason = "locked", "sign-in rejected");
            return Ok(SignInOutcome::Rejected(SignInRejection::locked(until, now)));
        }
        // Lock lapsed: start a fresh window of attempts.
        if lockout::clear_lapsed_lock(db, account.id, now).await? {
            account.failed_login_attempts = 0;
        }
        account.account_locked_until = None;
    }

    let matches =
        password::verify_password_async(password.to_string(), account.password_hash.clone())
            .await?;

    if !matches {
        let policy = LockoutPolicy::new(
            config.security.lockout_max_attempts,
            config.security.lockout_window(),
        );
        let rejection = match lockout::record_failed_attempt(db, account.id, policy).await? {
            FailedAttempt::Counted { remaining } => SignInRejection::InvalidCredentials {
                remaining_attempts: Some(remaining),
            },
            FailedAttempt::Locked { until } => SignInRejection::locked(until, now),
        };
        tracing::info!(user_id = account.id, reason = "bad_password", "sign-in rejected");
        return Ok(SignInOutcome::Rejected(rejection));
    }

    if config.security.require_email_verification && !account.email_verified {
        tracing::info!(user_id = account.id, reason = "email_not_verified", "sign-in rejected");
        return Ok(SignInOutcome::Rejected(SignInRejection::EmailNotVerified));
    }

    user::Entity::update_many()
        .col_expr(user::Column::FailedLoginAttempts, Expr::value(0))
        .col_expr(
            user::Column::AccountLockedUntil,
            Expr::value(Option::<NaiveDateTime>::None),
        )
        .col_expr(user::Column::LastLogin, Expr::value(Some(now)))
        .col_expr(user::Column::UpdatedAt, Expr::value(now))
        .filter(user::Column::Id.eq(account.id))
        .exec(db)
        .await?;
    account.failed_login_attempts = 0;
    account.account_locked_until = None;
    account.last_login = Some(now);
    account.updated_at = now;

    let role = rbac.role_claims(db, account.role_id).await?;
    let issued = session::create_session(db, issuer, account.id, client).await?;
    let access_token = issuer.generate_access_token(&account, role.clone())?;

    tracing::info!(user_id = account.id, "sign-in succeeded");

    Ok(SignInOutcome::Authenticated(Box::new(AuthenticatedSession {
        access_token,
        refresh_token: issued.refresh_token,
        session_id: issued.session_id,
        session_expires_at: issued.expires_at,
        user: account,
        role,
    })))
}
