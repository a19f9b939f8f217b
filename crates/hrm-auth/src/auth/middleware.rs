//! Token verification with silent refresh.
//!
//! Apply [`authenticate`] in front of every protected route. It resolves the
//! caller's identity from the access token and, when that token is missing or
//! no longer valid, transparently mints a new one from the refresh cookies.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hrm_auth::auth::middleware::authenticate;
//! use hrm_auth::auth::permission::require_permission;
//!
//! Router::new()
//!     .route("/employees/{id}", put(update_employee))
//!     .route_layer(from_fn(require_permission("EMPLOYEE_MANAGEMENT", Action::Update)))
//!     .route_layer(from_fn_with_state(state.clone(), authenticate))
//! ```
//!
//! Layers run bottom-up, so `authenticate` must be the last `route_layer`.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::cookies;
use crate::auth::refresh::{self, RefreshError};
use crate::controllers::AppState;
use crate::error::HrmError;

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Whether `response` already carries a `Set-Cookie` for `name`.
fn sets_cookie(response: &Response, name: &str) -> bool {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split_once('=').is_some_and(|(n, _)| n.trim() == name))
}

/// Resolve the caller's identity, silently refreshing when needed.
///
/// On success the [`AccessClaims`](crate::auth::claims::AccessClaims) are
/// inserted into the request extensions. Every failed refresh clears the
/// auth cookies.
pub async fn authenticate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let access = cookies::access_token(&jar).or_else(|| bearer_token(req.headers()));
    let sent_access = access.is_some();

    if let Some(token) = access.as_deref() {
        match state.issuer.verify_access_token(token) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                return next.run(req).await;
            }
            Err(err) => tracing::debug!(?err, "access token rejected"),
        }
    }

    let refresh_pair = cookies::refresh_token(&jar).zip(cookies::session_id(&jar));
    let Some((refresh_token, session_id)) = refresh_pair else {
        if sent_access {
            return (
                cookies::clear_auth_cookies(jar),
                HrmError::Forbidden("Invalid or expired token".to_string()),
            )
                .into_response();
        }
        return HrmError::Unauthorized("Access token required".to_string()).into_response();
    };

    match refresh::refresh_access(
        &state.db,
        &state.issuer,
        &state.rbac,
        &refresh_token,
        &session_id,
    )
    .await
    {
        Ok(refreshed) => {
            let jar = cookies::set_access_cookie(jar, &state.config, &refreshed.access_token);
            let jar = cookies::set_session_cookie(jar, &state.config, &refreshed.session_id);
            req.extensions_mut().insert(refreshed.claims);
            let response = next.run(req).await;
            // Handlers that end the session (logout-all, change-password)
            // clear these cookies themselves; the refreshed ones must not win.
            if sets_cookie(&response, cookies::ACCESS_TOKEN_COOKIE)
                || sets_cookie(&response, cookies::SESSION_ID_COOKIE)
            {
                return response;
            }
            (jar, response).into_response()
        }
        Err(RefreshError::Rejected(reason)) => {
            tracing::info!(reason, "silent refresh rejected");
            let err = if sent_access {
                HrmError::Forbidden("Invalid or expired token".to_string())
            } else {
                HrmError::Unauthorized("Session expired, please sign in again".to_string())
            };
            (cookies::clear_auth_cookies(jar), err).into_response()
        }
        Err(RefreshError::Failed(err)) => (cookies::clear_auth_cookies(jar), err).into_response(),
    }
}
