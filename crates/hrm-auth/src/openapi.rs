use utoipa::OpenApi;

use crate::auth::claims::{ActionFlags, PermissionGrant, RoleClaims};
use crate::controllers::auth::{
    ChangePasswordRequest, LogoutRequest, LogoutResponse, MeResponse, RefreshRequest,
    RefreshResponse, SignInRequest, SignInResponse,
};
use crate::error::{ErrorDetail, FieldError};
use crate::models::user::UserResponse;

/// OpenAPI document for the auth endpoints.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Auth API",
        version = "0.3.0",
        description = "Sign-in, session lifecycle and role-based access control."
    ),
    paths(
        crate::controllers::auth::sign_in,
        crate::controllers::auth::refresh_token,
        crate::controllers::auth::logout,
        crate::controllers::auth::logout_all,
        crate::controllers::auth::me,
        crate::controllers::auth::change_password,
    ),
    components(
        schemas(
            SignInRequest,
            SignInResponse,
            RefreshRequest,
            RefreshResponse,
            LogoutRequest,
            LogoutResponse,
            MeResponse,
            ChangePasswordRequest,
            UserResponse,
            RoleClaims,
            PermissionGrant,
            ActionFlags,
            ErrorDetail,
            FieldError,
        )
    ),
    tags(
        (name = "auth", description = "Authentication and session endpoints")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add the bearer and cookie security schemes to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme};

        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
            components.add_security_scheme(
                "cookie_auth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                    crate::auth::cookies::ACCESS_TOKEN_COOKIE,
                ))),
            );
        }
    }
}
