use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::auth::credentials::normalize_email;
use crate::auth::password;
use crate::auth::session;
use crate::error::HrmError;
use crate::models::user::{self, Entity as User};

/// Input for [`create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role_id: Option<i32>,
    pub email_verified: bool,
}

const USER_EXISTS: &str = "User with this email or username already exists";

/// Create a user with a hashed password.
pub async fn create_user(
    db: &DatabaseConnection,
    new_user: NewUser,
    min_password_length: usize,
) -> Result<user::Model, HrmError> {
    let email = normalize_email(&new_user.email);
    let username = new_user.username.trim().to_string();

    if email.is_empty() || username.is_empty() || new_user.password.is_empty() {
        return Err(HrmError::Validation(
            "Email, username, and password are required".to_string(),
        ));
    }
    check_password_length(&new_user.password, min_password_length)?;

    let existing = User::find()
        .filter(
            user::Column::Email
                .eq(&email)
                .or(user::Column::Username.eq(&username)),
        )
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(HrmError::Conflict(USER_EXISTS.to_string()));
    }

    let password_hash = password::hash_password_async(new_user.password).await?;
    let now = Utc::now().naive_utc();

    let model = user::ActiveModel {
        email: Set(email),
        username: Set(username),
        password_hash: Set(password_hash),
        role_id: Set(new_user.role_id),
        is_active: Set(true),
        email_verified: Set(new_user.email_verified),
        failed_login_attempts: Set(0),
        account_locked_until: Set(None),
        last_login: Set(None),
        password_changed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    // A concurrent create can still win the race to the unique index.
    let created = model
        .insert(db)
        .await
        .map_err(|e| HrmError::conflict_on_unique(e, USER_EXISTS))?;

    tracing::info!(user_id = created.id, "user created");
    Ok(created)
}

/// Replace a user's password after checking the current one.
///
/// Every active session of the user is deactivated. Returns how many were.
pub async fn change_password(
    db: &DatabaseConnection,
    user_id: i32,
    current_password: &str,
    new_password: &str,
    min_password_length: usize,
) -> Result<u64, HrmError> {
    check_password_length(new_password, min_password_length)?;

    let account = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| HrmError::NotFound("User not found".to_string()))?;

    let matches = password::verify_password_async(
        current_password.to_string(),
        account.password_hash.clone(),
    )
    .await?;
    if !matches {
        return Err(HrmError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let password_hash = password::hash_password_async(new_password.to_string()).await?;
    let now = Utc::now().naive_utc();

    let mut active: user::ActiveModel = account.into();
    active.password_hash = Set(password_hash);
    active.password_changed_at = Set(Some(now));
    active.updated_at = Set(now);
    active.update(db).await?;

    let revoked = session::deactivate_all_for_user(db, user_id).await?;
    tracing::info!(user_id, revoked, "password changed");
    Ok(revoked)
}

/// Flip a user's `is_active`. Deactivating also ends all their sessions.
pub async fn set_active(
    db: &DatabaseConnection,
    user_id: i32,
    is_active: bool,
) -> Result<user::Model, HrmError> {
    let account = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| HrmError::NotFound("User not found".to_string()))?;

    let mut active: user::ActiveModel = account.into();
    active.is_active = Set(is_active);
    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(db).await?;

    if !is_active {
        session::deactivate_all_for_user(db, user_id).await?;
    }
    Ok(updated)
}

fn check_password_length(password: &str, min: usize) -> Result<(), HrmError> {
    if password.chars().count() < min {
        return Err(HrmError::Validation(format!(
            "Password must be at least {} characters",
            min
        )));
    }
    Ok(())
}
