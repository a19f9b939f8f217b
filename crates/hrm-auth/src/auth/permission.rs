//! Resource/action permission checks against the role snapshot in the access token.
//!
//! Every check is fail-closed: no role, an inactive role, a missing grant row
//! or a false flag all deny. Nothing here touches the database.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hrm_auth::auth::claims::Action;
//! use hrm_auth::auth::permission::{require_permission, require_any_permission};
//!
//! Router::new()
//!     .route("/employees/{id}", delete(remove_employee))
//!     .route_layer(from_fn(require_permission("EMPLOYEE_MANAGEMENT", Action::Delete)))
//!     .route("/leave/{id}/decide", post(decide_leave))
//!     .route_layer(from_fn(require_any_permission(
//!         "LEAVE_REQUEST",
//!         &[Action::Approve, Action::Reject],
//!     )))
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use axum::{extract::Request, middleware::Next, response::Response};

use crate::auth::claims::{AccessClaims, Action, PermissionGrant};
use crate::error::HrmError;

/// Role name that passes [`check_admin`]. Compared exactly.
pub const ADMIN_ROLE: &str = "Admin";

/// Why a permission check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDenied {
    NoRole,
    RoleInactive,
    NoGrant { resource: String },
    ActionNotAllowed { resource: String, action: Action },
    NoneOfActions { resource: String, actions: Vec<Action> },
    NotAdmin,
}

/// `EMPLOYEE_MANAGEMENT` -> `employee management`.
pub fn humanize_resource(resource: &str) -> String {
    resource.replace('_', " ").to_lowercase()
}

impl fmt::Display for PermissionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionDenied::NoRole => f.write_str("No role assigned to this account"),
            PermissionDenied::RoleInactive => f.write_str("Your role is inactive"),
            PermissionDenied::NoGrant { resource } => {
                write!(f, "No permission configured for {}", resource)
            }
            PermissionDenied::ActionNotAllowed { resource, action } => write!(
                f,
                "You do not have permission to {} {}",
                action.verb(),
                humanize_resource(resource)
            ),
            PermissionDenied::NoneOfActions { resource, actions } => {
                let verbs: Vec<&str> = actions.iter().map(|a| a.verb()).collect();
                write!(
                    f,
                    "You do not have permission to {} {}",
                    verbs.join(" or "),
                    humanize_resource(resource)
                )
            }
            PermissionDenied::NotAdmin => f.write_str("Admin access required"),
        }
    }
}

impl From<PermissionDenied> for HrmError {
    fn from(denied: PermissionDenied) -> Self {
        HrmError::Forbidden(denied.to_string())
    }
}

fn grant_for<'a>(
    identity: &'a AccessClaims,
    resource: &str,
) -> Result<&'a PermissionGrant, PermissionDenied> {
    let role = identity.role.as_ref().ok_or(PermissionDenied::NoRole)?;
    if !role.is_active {
        return Err(PermissionDenied::RoleInactive);
    }
    role.grant_for(resource)
        .ok_or_else(|| PermissionDenied::NoGrant {
            resource: resource.to_string(),
        })
}

/// May the caller perform `action` on `resource`?
pub fn check(identity: &AccessClaims, resource: &str, action: Action) -> Result<(), PermissionDenied> {
    let grant = grant_for(identity, resource)?;
    if grant.actions.allows(action) {
        Ok(())
    } else {
        Err(PermissionDenied::ActionNotAllowed {
            resource: resource.to_string(),
            action,
        })
    }
}

/// Passes when at least one of `actions` is allowed. An empty list denies.
pub fn check_any(
    identity: &AccessClaims,
    resource: &str,
    actions: &[Action],
) -> Result<(), PermissionDenied> {
    let grant = grant_for(identity, resource)?;
    if actions.iter().any(|a| grant.actions.allows(*a)) {
        Ok(())
    } else {
        Err(PermissionDenied::NoneOfActions {
            resource: resource.to_string(),
            actions: actions.to_vec(),
        })
    }
}

/// Passes only when every one of `actions` is allowed; reports the first missing one.
pub fn check_all(
    identity: &AccessClaims,
    resource: &str,
    actions: &[Action],
) -> Result<(), PermissionDenied> {
    let grant = grant_for(identity, resource)?;
    match actions.iter().find(|a| !grant.actions.allows(**a)) {
        Some(missing) => Err(PermissionDenied::ActionNotAllowed {
            resource: resource.to_string(),
            action: *missing,
        }),
        None => Ok(()),
    }
}

pub fn check_admin(identity: &AccessClaims) -> Result<(), PermissionDenied> {
    match identity.role.as_ref() {
        Some(role) if role.is_active && role.name == ADMIN_ROLE => Ok(()),
        _ => Err(PermissionDenied::NotAdmin),
    }
}

type GuardFuture = Pin<Box<dyn Future<Output = Result<Response, HrmError>> + Send>>;

/// Run `decide` against the identity left by `authenticate`.
async fn guard(
    req: Request,
    next: Next,
    decide: impl FnOnce(&AccessClaims) -> Result<(), PermissionDenied>,
) -> Result<Response, HrmError> {
    let identity = req
        .extensions()
        .get::<AccessClaims>()
        .ok_or_else(|| HrmError::Unauthorized("Authentication required".to_string()))?;

    if let Err(denied) = decide(identity) {
        tracing::info!(user_id = identity.user_id, reason = %denied, "permission denied");
        return Err(denied.into());
    }

    Ok(next.run(req).await)
}

/// Middleware requiring `action` on `resource`.
///
/// Returns a closure suitable for use with `axum::middleware::from_fn`.
pub fn require_permission(
    resource: &'static str,
    action: Action,
) -> impl Fn(Request, Next) -> GuardFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        Box::pin(guard(req, next, move |id| check(id, resource, action)))
    }
}

/// Middleware requiring at least one of `actions` on `resource`.
pub fn require_any_permission(
    resource: &'static str,
    actions: &[Action],
) -> impl Fn(Request, Next) -> GuardFuture + Clone + Send + Sync + 'static {
    let actions = actions.to_vec();
    move |req: Request, next: Next| {
        let actions = actions.clone();
        Box::pin(guard(req, next, move |id| check_any(id, resource, &actions)))
    }
}

/// Middleware requiring every one of `actions` on `resource`.
pub fn require_all_permissions(
    resource: &'static str,
    actions: &[Action],
) -> impl Fn(Request, Next) -> GuardFuture + Clone + Send + Sync + 'static {
    let actions = actions.to_vec();
    move |req: Request, next: Next| {
        let actions = actions.clone();
        Box::pin(guard(req, next, move |id| check_all(id, resource, &actions)))
    }
}

/// Middleware requiring the `Admin` role.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, HrmError> {
    guard(req, next, check_admin).await
}
