use axum::{extract::FromRequestParts, http::request::Parts};

use crate::auth::claims::AccessClaims;
use crate::error::HrmError;

/// Extractor for the identity resolved by the `authenticate` middleware.
///
/// Usage in handlers:
/// ```rust,ignore
/// async fn my_handler(CurrentUser(claims): CurrentUser) -> impl IntoResponse {
///     // claims.user_id is the authenticated user's ID
/// }
/// ```
///
/// Rejects with 401 when the route is not behind `authenticate`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AccessClaims);

impl CurrentUser {
    pub fn user_id(&self) -> i32 {
        self.0.user_id
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = HrmError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessClaims>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| HrmError::Unauthorized("Authentication required".to_string()))
    }
}
