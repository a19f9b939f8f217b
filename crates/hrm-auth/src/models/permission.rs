use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Permission entity: a named resource that role grants refer to.
///
/// Permissions are identified by their `name` (e.g., `"EMPLOYEE_MANAGEMENT"`,
/// `"LEAVE_REQUEST"`). What a role may do with the resource lives on the
/// `role_permissions` row, not here.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Unique resource identifier (e.g., "EMPLOYEE_MANAGEMENT")
    #[sea_orm(unique)]
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    pub created_at: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::role_permission::Entity")]
    RolePermissions,
}

impl Related<super::role_permission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RolePermissions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
