use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::HrmError;

/// Buffer the body through axum's `Bytes` extractor so `DefaultBodyLimit` applies.
async fn read_body<S: Send + Sync>(req: Request, state: &S) -> Result<Bytes, HrmError> {
    Bytes::from_request(req, state).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            HrmError::PayloadTooLarge("Request body is too large".to_string())
        } else {
            HrmError::BadRequest(format!("Failed to read body: {}", rejection.body_text()))
        }
    })
}

/// JSON body that is deserialized and then checked with `validator`.
///
/// Usage in handlers:
/// ```rust,ignore
/// async fn sign_in(ValidatedJson(payload): ValidatedJson<SignInRequest>) -> impl IntoResponse {
///     // payload passed its #[validate] rules
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = HrmError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = read_body(req, state).await?;
        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| HrmError::Validation(format!("Invalid JSON: {}", e)))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// JSON body that may be absent. An empty body yields `None`.
pub struct OptionalJson<T>(pub Option<T>);

impl<S, T> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = HrmError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = read_body(req, state).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(None));
        }
        let value: T = serde_json::from_slice(&bytes)
            .map_err(|e| HrmError::Validation(format!("Invalid JSON: {}", e)))?;
        Ok(OptionalJson(Some(value)))
    }
}
