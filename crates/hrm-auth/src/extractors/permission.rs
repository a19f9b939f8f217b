use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::claims::{AccessClaims, Action};
use crate::auth::permission;
use crate::error::HrmError;

use super::CurrentUser;

/// Extractor for permission checks made inside a handler.
///
/// Use this when the resource or action is only known after reading the
/// request; otherwise prefer the `require_*` middleware.
///
/// ```rust,ignore
/// async fn decide(guard: PermissionGuard, Json(body): Json<Decision>) -> Result<..., HrmError> {
///     let action = if body.approve { Action::Approve } else { Action::Reject };
///     guard.require("LEAVE_REQUEST", action)?;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    identity: AccessClaims,
}

impl PermissionGuard {
    pub fn user_id(&self) -> i32 {
        self.identity.user_id
    }

    /// Name of the caller's role, if any.
    pub fn role(&self) -> Option<&str> {
        self.identity.role.as_ref().map(|r| r.name.as_str())
    }

    pub fn identity(&self) -> &AccessClaims {
        &self.identity
    }

    pub fn require(&self, resource: &str, action: Action) -> Result<(), HrmError> {
        Ok(permission::check(&self.identity, resource, action)?)
    }

    pub fn require_any(&self, resource: &str, actions: &[Action]) -> Result<(), HrmError> {
        Ok(permission::check_any(&self.identity, resource, actions)?)
    }

    pub fn require_all(&self, resource: &str, actions: &[Action]) -> Result<(), HrmError> {
        Ok(permission::check_all(&self.identity, resource, actions)?)
    }

    pub fn require_admin(&self) -> Result<(), HrmError> {
        Ok(permission::check_admin(&self.identity)?)
    }

    /// Check without producing an error.
    pub fn can(&self, resource: &str, action: Action) -> bool {
        permission::check(&self.identity, resource, action).is_ok()
    }
}

impl From<AccessClaims> for PermissionGuard {
    fn from(identity: AccessClaims) -> Self {
        PermissionGuard { identity }
    }
}

impl<S> FromRequestParts<S> for PermissionGuard
where
    S: Send + Sync,
{
    type Rejection = HrmError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;
        Ok(PermissionGuard { identity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{ActionFlags, PermissionGrant, RoleClaims, TokenType, CLAIMS_VERSION};

    fn guard(flags: ActionFlags) -> PermissionGuard {
        PermissionGuard::from(AccessClaims {
            ver: CLAIMS_VERSION,
            sub: "3".to_string(),
            user_id: 3,
            email: "e@x.com".to_string(),
            role_id: Some(4),
            role: Some(RoleClaims {
                id: 4,
                name: "Employee".to_string(),
                is_active: true,
                grants: vec![PermissionGrant {
                    resource: "LEAVE_REQUEST".to_string(),
                    actions: flags,
                }],
            }),
            typ: TokenType::Access,
            iat: 0,
            exp: 0,
        })
    }

    #[test]
    fn guard_maps_denials_to_forbidden() {
        let g = guard(ActionFlags::only(&[Action::Submit, Action::Cancel]));
        assert!(g.require("LEAVE_REQUEST", Action::Submit).is_ok());
        assert!(g.can("LEAVE_REQUEST", Action::Cancel));

        let err = g.require("LEAVE_REQUEST", Action::Approve).unwrap_err();
        assert!(matches!(err, HrmError::Forbidden(_)));
        assert!(g.require_admin().is_err());
        assert_eq!(g.role(), Some("Employee"));
    }
}
