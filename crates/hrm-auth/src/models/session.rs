use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per successful sign-in; the source of truth for refresh-token validity.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    /// Random 128-bit identifier, also sent as the `session_id` cookie
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: String,

    /// The user who owns this session
    pub user_id: i32,

    /// SHA-256 of the signed refresh token bound to this session
    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub refresh_token_hash: String,

    /// IP address
    pub ip_address: Option<String>,

    /// User-Agent
    pub user_agent: Option<String>,

    /// Cleared on logout or by the expiry sweeper
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    /// When the session (and its refresh token) expires
    pub expires_at: NaiveDateTime,

    /// Last sign-in or silent refresh on this session
    pub last_activity: NaiveDateTime,

    pub created_at: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A session can back a refresh only while active and unexpired.
    pub fn is_usable_at(&self, now: NaiveDateTime) -> bool {
        self.is_active && now < self.expires_at
    }
}
