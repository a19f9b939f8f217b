pub mod auth_user;
pub mod json;
pub mod permission;

pub use auth_user::CurrentUser;
pub use json::{OptionalJson, ValidatedJson};
pub use permission::PermissionGuard;
