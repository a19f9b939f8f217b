use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ErrorDetail;

/// Envelope shared by every `/api/auth` response.
///
/// ```json
/// { "success": true, "data": { "access_token": "..." } }
/// { "success": false, "error": { "code": "ACCOUNT_LOCKED", "message": "..." } }
/// ```
///
/// Handlers only build the success form; failures are rendered from
/// [`HrmError`](crate::error::HrmError), which picks the status code.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl<T: Serialize> axum::response::IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        axum::Json(self).into_response()
    }
}
