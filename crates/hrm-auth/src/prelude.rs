//! Everything a protected HR router needs, in one import.
//!
//! ```rust,ignore
//! use hrm_auth::prelude::*;
//! ```

// ── Core types ─────────────────────────────────────────────────
pub use crate::{ApiResponse, App, AppState, Config, HrmError};

// ── Auth pipeline ──────────────────────────────────────────────
pub use crate::auth::claims::{AccessClaims, Action};
pub use crate::auth::middleware::authenticate;
pub use crate::auth::permission::{
    require_admin, require_all_permissions, require_any_permission, require_permission,
};

// ── Extractors ─────────────────────────────────────────────────
pub use crate::extractors::{CurrentUser, PermissionGuard, ValidatedJson};

// ── Axum ───────────────────────────────────────────────────────
pub use axum::extract::State;
pub use axum::middleware::{from_fn, from_fn_with_state};
pub use axum::Router;
