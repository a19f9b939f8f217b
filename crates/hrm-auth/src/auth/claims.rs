//! Typed, versioned JWT payloads.
//!
//! Access tokens carry a snapshot of the caller's role and grants so the
//! permission evaluator never needs a database round-trip. Refresh tokens
//! carry only the user and session identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::role_permission;

/// Bumped whenever the claims layout changes; tokens with another version are rejected.
pub const CLAIMS_VERSION: u16 = 1;

/// Discriminates access from refresh tokens so one can never stand in for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// An operation on a resource, backed by one `can_*` flag of a grant row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    Assign,
    Import,
    Export,
    Submit,
    Cancel,
    ViewSalary,
}

impl Action {
    pub const ALL: [Action; 12] = [
        Action::View,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Approve,
        Action::Reject,
        Action::Assign,
        Action::Import,
        Action::Export,
        Action::Submit,
        Action::Cancel,
        Action::ViewSalary,
    ];

    /// Name of the grant column this action reads.
    pub fn flag_name(&self) -> &'static str {
        match self {
            Action::View => "can_view",
            Action::Create => "can_create",
            Action::Update => "can_update",
            Action::Delete => "can_delete",
            Action::Approve => "can_approve",
            Action::Reject => "can_reject",
            Action::Assign => "can_assign",
            Action::Import => "can_import",
            Action::Export => "can_export",
            Action::Submit => "can_submit",
            Action::Cancel => "can_cancel",
            Action::ViewSalary => "can_view_salary",
        }
    }

    /// Verb used in user-facing denial messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Assign => "assign",
            Action::Import => "import",
            Action::Export => "export",
            Action::Submit => "submit",
            Action::Cancel => "cancel",
            Action::ViewSalary => "view salaries in",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag_name())
    }
}

impl FromStr for Action {
    type Err = String;

    /// Accepts `update`, `can_update` and `canUpdate`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_lowercase();
        let stripped = normalized.strip_prefix("can");

        Action::ALL
            .into_iter()
            .find(|a| {
                let key = a.flag_name().trim_start_matches("can_").replace('_', "");
                key == normalized || stripped == Some(key.as_str())
            })
            .ok_or_else(|| format!("Unknown action '{}'", s))
    }
}

/// The action flags of one grant row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActionFlags {
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub can_delete: bool,
    #[serde(default)]
    pub can_approve: bool,
    #[serde(default)]
    pub can_reject: bool,
    #[serde(default)]
    pub can_assign: bool,
    #[serde(default)]
    pub can_import: bool,
    #[serde(default)]
    pub can_export: bool,
    #[serde(default)]
    pub can_submit: bool,
    #[serde(default)]
    pub can_cancel: bool,
    #[serde(default)]
    pub can_view_salary: bool,
}

impl ActionFlags {
    /// Flags with only the given actions enabled.
    pub fn only(actions: &[Action]) -> Self {
        let mut flags = ActionFlags::default();
        for action in actions {
            *flags.flag_mut(*action) = true;
        }
        flags
    }

    /// Every action enabled.
    pub fn all() -> Self {
        Self::only(&Action::ALL)
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::View => self.can_view,
            Action::Create => self.can_create,
            Action::Update => self.can_update,
            Action::Delete => self.can_delete,
            Action::Approve => self.can_approve,
            Action::Reject => self.can_reject,
            Action::Assign => self.can_assign,
            Action::Import => self.can_import,
            Action::Export => self.can_export,
            Action::Submit => self.can_submit,
            Action::Cancel => self.can_cancel,
            Action::ViewSalary => self.can_view_salary,
        }
    }

    fn flag_mut(&mut self, action: Action) -> &mut bool {
        match action {
            Action::View => &mut self.can_view,
            Action::Create => &mut self.can_create,
            Action::Update => &mut self.can_update,
            Action::Delete => &mut self.can_delete,
            Action::Approve => &mut self.can_approve,
            Action::Reject => &mut self.can_reject,
            Action::Assign => &mut self.can_assign,
            Action::Import => &mut self.can_import,
            Action::Export => &mut self.can_export,
            Action::Submit => &mut self.can_submit,
            Action::Cancel => &mut self.can_cancel,
            Action::ViewSalary => &mut self.can_view_salary,
        }
    }
}

impl From<&role_permission::Model> for ActionFlags {
    fn from(row: &role_permission::Model) -> Self {
        ActionFlags {
            can_view: row.can_view,
            can_create: row.can_create,
            can_update: row.can_update,
            can_delete: row.can_delete,
            can_approve: row.can_approve,
            can_reject: row.can_reject,
            can_assign: row.can_assign,
            can_import: row.can_import,
            can_export: row.can_export,
            can_submit: row.can_submit,
            can_cancel: row.can_cancel,
            can_view_salary: row.can_view_salary,
        }
    }
}

/// A role's grant on one resource, as embedded in the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionGrant {
    pub resource: String,
    #[serde(flatten)]
    pub actions: ActionFlags,
}

/// Snapshot of the caller's role taken when the access token was minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoleClaims {
    pub id: i32,
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub grants: Vec<PermissionGrant>,
}

impl RoleClaims {
    /// The grant row for `resource`, if the role has one.
    pub fn grant_for(&self, resource: &str) -> Option<&PermissionGrant> {
        self.grants.iter().find(|g| g.resource == resource)
    }
}

/// Access token payload; also the identity attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessClaims {
    /// Claims layout version
    pub ver: u16,
    /// Subject (user ID as string)
    pub sub: String,
    pub user_id: i32,
    pub email: String,
    pub role_id: Option<i32>,
    pub role: Option<RoleClaims>,
    pub typ: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Refresh token payload. Deliberately small: no role, no email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub user_id: i32,
    pub session_id: String,
    pub typ: TokenType,
    /// Unique token id
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parses_all_spellings() {
        assert_eq!("update".parse::<Action>(), Ok(Action::Update));
        assert_eq!("can_update".parse::<Action>(), Ok(Action::Update));
        assert_eq!("canUpdate".parse::<Action>(), Ok(Action::Update));
        assert_eq!("canViewSalary".parse::<Action>(), Ok(Action::ViewSalary));
        assert_eq!("cancel".parse::<Action>(), Ok(Action::Cancel));
        assert_eq!("canCancel".parse::<Action>(), Ok(Action::Cancel));
        assert!("fly".parse::<Action>().is_err());
    }

    #[test]
    fn flags_only_enable_listed_actions() {
        let flags = ActionFlags::only(&[Action::View, Action::Update]);
        assert!(flags.allows(Action::View));
        assert!(flags.allows(Action::Update));
        assert!(!flags.allows(Action::Delete));
        assert!(Action::ALL.iter().all(|a| ActionFlags::all().allows(*a)));
        assert!(Action::ALL.iter().all(|a| !ActionFlags::default().allows(*a)));
    }

    #[test]
    fn grant_serializes_flat() {
        let grant = PermissionGrant {
            resource: "EMPLOYEE_MANAGEMENT".to_string(),
            actions: ActionFlags::only(&[Action::Update]),
        };
        let json = serde_json::to_value(&grant).unwrap();
        assert_eq!(json["resource"], "EMPLOYEE_MANAGEMENT");
        assert_eq!(json["can_update"], true);
        assert_eq!(json["can_delete"], false);
    }
}
