use chrono::{Duration, NaiveDateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::error::HrmError;
use crate::models::user;

/// State of the failed-attempt counter after a wrong password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedAttempt {
    /// Still below the limit.
    Counted { remaining: u32 },
    /// The limit was reached and the account is now locked.
    Locked { until: NaiveDateTime },
}

/// Lockout policy: how many failures are tolerated and for how long the lock holds.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        LockoutPolicy {
            max_attempts: max_attempts.max(1),
            window,
        }
    }
}

/// Whole minutes left on a lock, rounded up and never below one.
pub fn remaining_minutes(locked_until: NaiveDateTime, now: NaiveDateTime) -> i64 {
    let secs = (locked_until - now).num_seconds().max(0);
    ((secs + 59) / 60).max(1)
}

/// Record a failed attempt.
///
/// The counter is incremented in SQL so concurrent failures are never lost;
/// the lock is then set only if no other request has set it already.
pub async fn record_failed_attempt<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    policy: LockoutPolicy,
) -> Result<FailedAttempt, HrmError> {
    let now = Utc::now().naive_utc();

    user::Entity::update_many()
        .col_expr(
            user::Column::FailedLoginAttempts,
            Expr::col(user::Column::FailedLoginAttempts).add(1),
        )
        .col_expr(user::Column::UpdatedAt, Expr::value(now))
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;

    let current = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| HrmError::NotFound(format!("User {} not found", user_id)))?;

    let count = current.failed_login_attempts.max(0) as u32;
    if count < policy.max_attempts {
        return Ok(FailedAttempt::Counted {
            remaining: policy.max_attempts - count,
        });
    }

    if let Some(until) = current.account_locked_until.filter(|u| *u > now) {
        return Ok(FailedAttempt::Locked { until });
    }

    let until = now + policy.window;
    user::Entity::update_many()
        .col_expr(user::Column::AccountLockedUntil, Expr::value(Some(until)))
        .filter(user::Column::Id.eq(user_id))
        .filter(
            user::Column::AccountLockedUntil
                .is_null()
                .or(user::Column::AccountLockedUntil.lte(now)),
        )
        .exec(db)
        .await?;

    tracing::warn!(user_id, attempts = count, %until, "account locked after repeated failures");

    Ok(FailedAttempt::Locked { until })
}

/// Clear the counter once a lock has lapsed, starting a fresh window.
///
/// Only the request that still sees the lapsed lock row performs the reset;
/// concurrent requests get `false` and leave the new window's count alone.
pub async fn clear_lapsed_lock<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    now: NaiveDateTime,
) -> Result<bool, HrmError> {
    let result = user::Entity::update_many()
        .col_expr(user::Column::FailedLoginAttempts, Expr::value(0))
        .col_expr(
            user::Column::AccountLockedUntil,
            Expr::value(Option::<NaiveDateTime>::None),
        )
        .col_expr(user::Column::UpdatedAt, Expr::value(now))
        .filter(user::Column::Id.eq(user_id))
        .filter(user::Column::AccountLockedUntil.lte(now))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}
