use axum::{
    extract::State,
    http::HeaderMap,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, NaiveDateTime};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::claims::RoleClaims;
use crate::auth::middleware::authenticate;
use crate::auth::refresh::{self, RefreshError};
use crate::auth::session::{self, ClientInfo};
use crate::auth::{cookies, credentials, users};
use crate::error::HrmError;
use crate::extractors::{CurrentUser, OptionalJson, ValidatedJson};
use crate::models::user::{Entity as User, UserResponse};
use crate::response::ApiResponse;

use super::AppState;

// ── Request / Response types ──

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignInRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignInResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user: UserResponse,
    pub role: Option<RoleClaims>,
}

/// Body for `/refresh-token`; cookies take precedence.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    /// Access token expiry (UTC)
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    /// Number of sessions deactivated by this call
    pub sessions_revoked: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
    pub role: Option<RoleClaims>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

// ── Routes ──

/// Auth routes, to be nested at `/api/auth`.
pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/logout-all", post(logout_all))
        .route("/me", get(me))
        .route("/change-password", post(change_password))
        .route_layer(from_fn_with_state(state, authenticate));

    Router::new()
        .route("/sign-in", post(sign_in))
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .merge(protected)
}

fn extract_client_info(headers: &HeaderMap) -> ClientInfo {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        });

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    ClientInfo {
        ip_address,
        user_agent,
    }
}

// ── Handlers ──

/// Sign in with email and password.
#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in; auth cookies set", body = ApiResponse<SignInResponse>),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Invalid email or password"),
        (status = 403, description = "Account deactivated or email not verified"),
        (status = 423, description = "Account locked")
    ),
    tag = "auth"
)]
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(payload): ValidatedJson<SignInRequest>,
) -> Result<(CookieJar, ApiResponse<SignInResponse>), HrmError> {
    let client = extract_client_info(&headers);

    let signed_in = credentials::sign_in(
        &state.db,
        &state.config,
        &state.issuer,
        &state.rbac,
        &payload.email,
        &payload.password,
        &client,
    )
    .await?
    .into_result()?;

    let jar = cookies::set_auth_cookies(
        jar,
        &state.config,
        &signed_in.access_token,
        &signed_in.refresh_token,
        &signed_in.session_id,
    );

    Ok((
        jar,
        ApiResponse::success(SignInResponse {
            access_token: signed_in.access_token,
            refresh_token: signed_in.refresh_token,
            session_id: signed_in.session_id,
            expires_in: state.config.jwt_expires_in_secs,
            user: UserResponse::from(signed_in.user),
            role: signed_in.role,
        }),
    ))
}

/// Mint a new access token from the refresh token and session id.
#[utoipa::path(
    post,
    path = "/api/auth/refresh-token",
    request_body(content = RefreshRequest, description = "Optional when the refresh cookies are present"),
    responses(
        (status = 200, description = "Access token refreshed", body = ApiResponse<RefreshResponse>),
        (status = 401, description = "Refresh session invalid; auth cookies cleared")
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    OptionalJson(body): OptionalJson<RefreshRequest>,
) -> Result<(CookieJar, ApiResponse<RefreshResponse>), (CookieJar, HrmError)> {
    let body = body.unwrap_or_default();
    let token = cookies::refresh_token(&jar).or(body.refresh_token);
    let session_id = cookies::session_id(&jar).or(body.session_id);

    let (Some(token), Some(session_id)) = (token, session_id) else {
        return Err((
            cookies::clear_auth_cookies(jar),
            HrmError::Unauthorized("Refresh token and session id are required".to_string()),
        ));
    };

    match refresh::refresh_access(&state.db, &state.issuer, &state.rbac, &token, &session_id)
        .await
    {
        Ok(refreshed) => {
            let jar = cookies::set_access_cookie(jar, &state.config, &refreshed.access_token);
            let jar = cookies::set_session_cookie(jar, &state.config, &refreshed.session_id);
            let expires_at = DateTime::from_timestamp(refreshed.claims.exp, 0)
                .map(|dt| dt.naive_utc())
                .unwrap_or_default();
            Ok((
                jar,
                ApiResponse::success(RefreshResponse {
                    access_token: refreshed.access_token,
                    expires_at,
                }),
            ))
        }
        Err(err) => {
            if let RefreshError::Rejected(reason) = &err {
                tracing::info!(reason, "refresh rejected");
            }
            Err((cookies::clear_auth_cookies(jar), err.into()))
        }
    }
}

/// End the current session. Succeeds even when there is no session.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body(content = LogoutRequest, description = "Optional when the session cookie is present"),
    responses(
        (status = 200, description = "Logged out; auth cookies cleared", body = ApiResponse<LogoutResponse>)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    OptionalJson(body): OptionalJson<LogoutRequest>,
) -> Result<(CookieJar, ApiResponse<LogoutResponse>), HrmError> {
    let session_id = cookies::session_id(&jar).or(body.and_then(|b| b.session_id));

    let revoked = match session_id {
        Some(id) => session::deactivate_session(&state.db, &id).await?,
        None => false,
    };

    Ok((
        cookies::clear_auth_cookies(jar),
        ApiResponse::success(LogoutResponse {
            sessions_revoked: u64::from(revoked),
        }),
    ))
}

/// End every session of the caller.
#[utoipa::path(
    post,
    path = "/api/auth/logout-all",
    responses(
        (status = 200, description = "All sessions ended", body = ApiResponse<LogoutResponse>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout_all(
    State(state): State<AppState>,
    jar: CookieJar,
    user: CurrentUser,
) -> Result<(CookieJar, ApiResponse<LogoutResponse>), HrmError> {
    let revoked = session::deactivate_all_for_user(&state.db, user.user_id()).await?;
    tracing::info!(user_id = user.user_id(), revoked, "logged out everywhere");

    Ok((
        cookies::clear_auth_cookies(jar),
        ApiResponse::success(LogoutResponse {
            sessions_revoked: revoked,
        }),
    ))
}

/// The signed-in user and their role snapshot.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<MeResponse>),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<ApiResponse<MeResponse>, HrmError> {
    let account = User::find_by_id(claims.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| HrmError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::success(MeResponse {
        user: UserResponse::from(account),
        role: claims.role,
    }))
}

/// Change the caller's password. Ends every session, including this one.
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; all sessions ended", body = ApiResponse<LogoutResponse>),
        (status = 400, description = "New password too short"),
        (status = 401, description = "Current password incorrect")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    jar: CookieJar,
    user: CurrentUser,
    ValidatedJson(payload): ValidatedJson<ChangePasswordRequest>,
) -> Result<(CookieJar, ApiResponse<LogoutResponse>), HrmError> {
    let revoked = users::change_password(
        &state.db,
        user.user_id(),
        &payload.current_password,
        &payload.new_password,
        state.config.security.min_password_length,
    )
    .await?;

    Ok((
        cookies::clear_auth_cookies(jar),
        ApiResponse::success(LogoutResponse {
            sessions_revoked: revoked,
        }),
    ))
}
