pub mod claims;
pub mod cookies;
pub mod credentials;
pub mod jwt;
pub mod lockout;
pub mod middleware;
pub mod password;
pub mod permission;
pub mod rbac;
pub mod refresh;
pub mod session;
pub mod sweeper;
pub mod users;

pub use claims::{AccessClaims, Action, ActionFlags, PermissionGrant, RoleClaims};
pub use credentials::{sign_in, SignInOutcome, SignInRejection};
pub use jwt::TokenIssuer;
pub use middleware::authenticate;
pub use password::{hash_password, verify_password};
pub use permission::{
    require_admin, require_all_permissions, require_any_permission, require_permission,
    PermissionDenied,
};
pub use rbac::RbacService;
pub use sweeper::SessionSweeper;
