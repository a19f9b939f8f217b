use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::auth::claims::AccessClaims;
use crate::auth::jwt::TokenIssuer;
use crate::auth::rbac::RbacService;
use crate::auth::session;
use crate::error::HrmError;
use crate::models::user;

/// A new access token minted from a valid refresh session.
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub claims: AccessClaims,
    pub session_id: String,
}

#[derive(Debug)]
pub enum RefreshError {
    /// The refresh token or session cannot be used. The string is for logs only.
    Rejected(&'static str),
    /// Infrastructure failure while checking the session.
    Failed(HrmError),
}

impl From<HrmError> for RefreshError {
    fn from(err: HrmError) -> Self {
        RefreshError::Failed(err)
    }
}

impl From<RefreshError> for HrmError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Rejected(_) => {
                HrmError::Unauthorized("Invalid or expired refresh session".to_string())
            }
            RefreshError::Failed(err) => err,
        }
    }
}

/// Mint a new access token from a refresh token and its session id.
///
/// The refresh token is not consumed: any number of refreshes, including
/// concurrent ones, succeed while the session stays active and unexpired.
pub async fn refresh_access(
    db: &DatabaseConnection,
    issuer: &TokenIssuer,
    rbac: &RbacService,
    refresh_token: &str,
    session_id: &str,
) -> Result<RefreshedAccess, RefreshError> {
    let claims = issuer
        .verify_refresh_token(refresh_token)
        .map_err(|_| RefreshError::Rejected("invalid refresh token"))?;
    if claims.session_id != session_id {
        return Err(RefreshError::Rejected("session id mismatch"));
    }

    let found = session::find_active(db, session_id, refresh_token)
        .await?
        .ok_or(RefreshError::Rejected("session not found or inactive"))?;
    if !found.is_usable_at(Utc::now().naive_utc()) {
        return Err(RefreshError::Rejected("session expired"));
    }
    if found.user_id != claims.user_id {
        return Err(RefreshError::Rejected("session belongs to another user"));
    }

    let account = user::Entity::find_by_id(found.user_id)
        .one(db)
        .await
        .map_err(HrmError::from)?
        .filter(|u| u.is_active)
        .ok_or(RefreshError::Rejected("user missing or inactive"))?;

    session::touch(db, session_id).await?;

    let role = rbac.role_claims(db, account.role_id).await?;
    let (access_token, claims) = issuer.issue_access_token(&account, role)?;

    tracing::debug!(user_id = account.id, "access token refreshed");

    Ok(RefreshedAccess {
        access_token,
        claims,
        session_id: found.session_id,
    })
}
