//! Role-Based Access Control (RBAC) administration and role snapshots.
//!
//! Grants live in `role_permissions`, one row per `(role, resource)` pair with
//! a flag per action. The service loads a role's grants into a [`RoleClaims`]
//! snapshot that is embedded in access tokens at mint time.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐    ┌──────────────────┐    ┌────────────────┐
//! │  sign-in / │───→│   RbacService    │───→│   Database     │
//! │  refresh   │    │ (cached claims)  │    │ (roles, grants)│
//! └───────────┘    └────────┬─────────┘    └────────────────┘
//!                           │ RoleClaims
//!                  ┌────────▼─────────┐
//!                  │  access token    │──→ permission::check (no DB)
//!                  └──────────────────┘
//! ```
//!
//! Changing a grant invalidates the cached snapshot, but tokens already
//! issued keep their old snapshot until the next silent refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TryIntoModel,
};
use tokio::sync::RwLock;

use crate::auth::claims::{ActionFlags, PermissionGrant, RoleClaims};
use crate::error::HrmError;
use crate::models::permission::{self, Entity as Permission};
use crate::models::role::{self, Entity as Role};
use crate::models::role_permission::{self, Entity as RolePermission};

/// Default cache TTL: 5 minutes.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
struct CachedRole {
    claims: Option<RoleClaims>,
    cached_at: Instant,
}

/// RBAC service with an in-memory cache of role snapshots.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct RbacService {
    inner: Arc<RbacInner>,
}

struct RbacInner {
    /// Cache: role id → snapshot (`None` when the role does not exist)
    cache: RwLock<HashMap<i32, CachedRole>>,
    cache_ttl: Duration,
}

impl RbacService {
    /// Create a new RBAC service with default cache TTL (5 minutes).
    pub fn new() -> Self {
        Self::with_cache_ttl(DEFAULT_CACHE_TTL)
    }

    /// Create a new RBAC service with a custom cache TTL.
    pub fn with_cache_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RbacInner {
                cache: RwLock::new(HashMap::new()),
                cache_ttl: ttl,
            }),
        }
    }

    /// Snapshot of a role and its grants, for embedding in an access token.
    ///
    /// Returns `None` when `role_id` is `None` or refers to a missing role.
    pub async fn role_claims<C: ConnectionTrait>(
        &self,
        db: &C,
        role_id: Option<i32>,
    ) -> Result<Option<RoleClaims>, HrmError> {
        let Some(role_id) = role_id else {
            return Ok(None);
        };

        {
            let cache = self.inner.cache.read().await;
            if let Some(cached) = cache.get(&role_id) {
                if cached.cached_at.elapsed() < self.inner.cache_ttl {
                    return Ok(cached.claims.clone());
                }
            }
        }

        let claims = load_role_claims(db, role_id).await?;

        {
            let mut cache = self.inner.cache.write().await;
            cache.insert(
                role_id,
                CachedRole {
                    claims: claims.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        Ok(claims)
    }

    /// Drop the cached snapshot of one role.
    pub async fn invalidate_role(&self, role_id: i32) {
        let mut cache = self.inner.cache.write().await;
        cache.remove(&role_id);
    }

    /// Drop every cached snapshot.
    pub async fn invalidate_all(&self) {
        let mut cache = self.inner.cache.write().await;
        cache.clear();
    }

    // ═══ Admin API ═══

    /// Create a role.
    pub async fn create_role<C: ConnectionTrait>(
        db: &C,
        name: &str,
        description: Option<&str>,
    ) -> Result<role::Model, HrmError> {
        let exists = Role::find()
            .filter(role::Column::Name.eq(name))
            .one(db)
            .await?;
        if exists.is_some() {
            return Err(HrmError::Conflict(format!("Role '{}' already exists", name)));
        }

        let now = Utc::now().naive_utc();
        let model = role::ActiveModel {
            name: Set(name.to_string()),
            description: Set(description.map(|d| d.to_string())),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        model.insert(db).await.map_err(|e| {
            HrmError::conflict_on_unique(e, format!("Role '{}' already exists", name))
        })
    }

    /// Activate or deactivate a role. A deactivated role grants nothing.
    pub async fn set_role_active<C: ConnectionTrait>(
        &self,
        db: &C,
        role_id: i32,
        is_active: bool,
    ) -> Result<role::Model, HrmError> {
        let existing = Role::find_by_id(role_id)
            .one(db)
            .await?
            .ok_or_else(|| HrmError::NotFound(format!("Role {} not found", role_id)))?;

        let mut active: role::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now().naive_utc());
        let updated = active.update(db).await?;

        self.invalidate_role(role_id).await;
        Ok(updated)
    }

    /// Create a permission (resource) by name.
    pub async fn create_permission<C: ConnectionTrait>(
        db: &C,
        name: &str,
        description: Option<&str>,
    ) -> Result<permission::Model, HrmError> {
        let exists = Permission::find()
            .filter(permission::Column::Name.eq(name))
            .one(db)
            .await?;
        if exists.is_some() {
            return Err(HrmError::Conflict(format!(
                "Permission '{}' already exists",
                name
            )));
        }

        let model = permission::ActiveModel {
            name: Set(name.to_string()),
            description: Set(description.map(|d| d.to_string())),
            created_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        };
        model.insert(db).await.map_err(|e| {
            HrmError::conflict_on_unique(e, format!("Permission '{}' already exists", name))
        })
    }

    /// List all permissions.
    pub async fn list_permissions<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<permission::Model>, HrmError> {
        Ok(Permission::find()
            .order_by_asc(permission::Column::Name)
            .all(db)
            .await?)
    }

    /// Set the action flags a role has on a resource, creating the grant row if needed.
    ///
    /// A role has at most one row per resource, so this updates in place when
    /// the row already exists.
    pub async fn upsert_grant<C: ConnectionTrait>(
        &self,
        db: &C,
        role_id: i32,
        resource: &str,
        flags: ActionFlags,
    ) -> Result<role_permission::Model, HrmError> {
        let perm = find_permission(db, resource).await?;
        let now = Utc::now().naive_utc();

        let existing = RolePermission::find()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .filter(role_permission::Column::PermissionId.eq(perm.id))
            .one(db)
            .await?;

        let mut active: role_permission::ActiveModel = match existing {
            Some(row) => row.into(),
            None => role_permission::ActiveModel {
                role_id: Set(role_id),
                permission_id: Set(perm.id),
                created_at: Set(now),
                ..Default::default()
            },
        };
        active.can_view = Set(flags.can_view);
        active.can_create = Set(flags.can_create);
        active.can_update = Set(flags.can_update);
        active.can_delete = Set(flags.can_delete);
        active.can_approve = Set(flags.can_approve);
        active.can_reject = Set(flags.can_reject);
        active.can_assign = Set(flags.can_assign);
        active.can_import = Set(flags.can_import);
        active.can_export = Set(flags.can_export);
        active.can_submit = Set(flags.can_submit);
        active.can_cancel = Set(flags.can_cancel);
        active.can_view_salary = Set(flags.can_view_salary);
        active.updated_at = Set(now);

        let saved = active.save(db).await?;
        let row = saved.try_into_model()?;

        self.invalidate_role(role_id).await;
        tracing::info!(role_id, resource, "role grant updated");
        Ok(row)
    }

    /// Remove a role's grant on a resource. Idempotent.
    pub async fn revoke_grant<C: ConnectionTrait>(
        &self,
        db: &C,
        role_id: i32,
        resource: &str,
    ) -> Result<(), HrmError> {
        let perm = find_permission(db, resource).await?;

        RolePermission::delete_many()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .filter(role_permission::Column::PermissionId.eq(perm.id))
            .exec(db)
            .await?;

        self.invalidate_role(role_id).await;
        tracing::info!(role_id, resource, "role grant revoked");
        Ok(())
    }

    /// All grants of a role, straight from the database.
    pub async fn grants_for_role<C: ConnectionTrait>(
        db: &C,
        role_id: i32,
    ) -> Result<Vec<PermissionGrant>, HrmError> {
        let rows = RolePermission::find()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .find_also_related(Permission)
            .all(db)
            .await?;

        let mut grants: Vec<PermissionGrant> = rows
            .into_iter()
            .filter_map(|(row, perm)| {
                perm.map(|p| PermissionGrant {
                    resource: p.name,
                    actions: ActionFlags::from(&row),
                })
            })
            .collect();
        grants.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(grants)
    }
}

impl Default for RbacService {
    fn default() -> Self {
        Self::new()
    }
}

async fn find_permission<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<permission::Model, HrmError> {
    Permission::find()
        .filter(permission::Column::Name.eq(name))
        .one(db)
        .await?
        .ok_or_else(|| HrmError::NotFound(format!("Permission '{}' not found", name)))
}

async fn load_role_claims<C: ConnectionTrait>(
    db: &C,
    role_id: i32,
) -> Result<Option<RoleClaims>, HrmError> {
    let Some(role) = Role::find_by_id(role_id).one(db).await? else {
        return Ok(None);
    };
    let grants = RbacService::grants_for_role(db, role_id).await?;

    Ok(Some(RoleClaims {
        id: role.id,
        name: role.name,
        is_active: role.is_active,
        grants,
    }))
}
