use chrono::{NaiveDateTime, Utc};
use rand::RngCore;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use sha2::{Digest, Sha256};

use crate::auth::jwt::TokenIssuer;
use crate::error::HrmError;
use crate::models::session;

/// Request metadata recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A freshly created session and the refresh token bound to it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: String,
    pub refresh_token: String,
    pub expires_at: NaiveDateTime,
}

/// 128-bit random session id, hex-encoded.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of a refresh token; only this digest is stored.
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Create a new session row and the refresh token that unlocks it.
///
/// Every sign-in gets its own row, so a user may hold several sessions at once.
pub async fn create_session<C: ConnectionTrait>(
    db: &C,
    issuer: &TokenIssuer,
    user_id: i32,
    client: &ClientInfo,
) -> Result<IssuedSession, HrmError> {
    let session_id = generate_session_id();
    let (refresh_token, _jti) = issuer.generate_refresh_token(user_id, &session_id)?;
    let now = Utc::now().naive_utc();
    let expires_at = now + issuer.refresh_ttl();

    session::ActiveModel {
        session_id: Set(session_id.clone()),
        user_id: Set(user_id),
        refresh_token_hash: Set(hash_refresh_token(&refresh_token)),
        ip_address: Set(client.ip_address.clone()),
        user_agent: Set(client.user_agent.clone()),
        is_active: Set(true),
        expires_at: Set(expires_at),
        last_activity: Set(now),
        created_at: Set(now),
    }
    .insert(db)
    .await?;

    tracing::debug!(user_id, "session created");

    Ok(IssuedSession {
        session_id,
        refresh_token,
        expires_at,
    })
}

/// The active session matching both the id and the refresh token, if any.
///
/// Expiry is not checked here; callers use [`session::Model::is_usable_at`].
pub async fn find_active<C: ConnectionTrait>(
    db: &C,
    session_id: &str,
    refresh_token: &str,
) -> Result<Option<session::Model>, HrmError> {
    let found = session::Entity::find_by_id(session_id.to_string())
        .filter(session::Column::RefreshTokenHash.eq(hash_refresh_token(refresh_token)))
        .filter(session::Column::IsActive.eq(true))
        .one(db)
        .await?;
    Ok(found)
}

/// Record activity on a session.
pub async fn touch<C: ConnectionTrait>(db: &C, session_id: &str) -> Result<(), HrmError> {
    session::Entity::update_many()
        .col_expr(
            session::Column::LastActivity,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(session::Column::SessionId.eq(session_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Deactivate one session (logout). Returns whether an active row was changed.
pub async fn deactivate_session<C: ConnectionTrait>(
    db: &C,
    session_id: &str,
) -> Result<bool, HrmError> {
    let result = session::Entity::update_many()
        .col_expr(session::Column::IsActive, Expr::value(false))
        .filter(session::Column::SessionId.eq(session_id))
        .filter(session::Column::IsActive.eq(true))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Deactivate every active session of a user (logout everywhere).
pub async fn deactivate_all_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<u64, HrmError> {
    let result = session::Entity::update_many()
        .col_expr(session::Column::IsActive, Expr::value(false))
        .filter(session::Column::UserId.eq(user_id))
        .filter(session::Column::IsActive.eq(true))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Flip `is_active` off for every session past its expiry.
pub async fn sweep_expired<C: ConnectionTrait>(db: &C) -> Result<u64, HrmError> {
    let result = session::Entity::update_many()
        .col_expr(session::Column::IsActive, Expr::value(false))
        .filter(session::Column::ExpiresAt.lt(Utc::now().naive_utc()))
        .filter(session::Column::IsActive.eq(true))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Physically delete inactive sessions last touched before `older_than`.
pub async fn purge_inactive<C: ConnectionTrait>(
    db: &C,
    older_than: NaiveDateTime,
) -> Result<u64, HrmError> {
    let result = session::Entity::delete_many()
        .filter(session::Column::IsActive.eq(false))
        .filter(session::Column::LastActivity.lt(older_than))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Active sessions of a user, newest first.
pub async fn active_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Vec<session::Model>, HrmError> {
    use sea_orm::QueryOrder;

    let rows = session::Entity::find()
        .filter(session::Column::UserId.eq(user_id))
        .filter(session::Column::IsActive.eq(true))
        .order_by_desc(session::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(rows)
}
