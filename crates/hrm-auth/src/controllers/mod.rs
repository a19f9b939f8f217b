use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::auth::jwt::TokenIssuer;
use crate::auth::rbac::RbacService;
use crate::config::Config;

/// Shared application state available in all handlers and auth middleware.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub issuer: TokenIssuer,
    pub rbac: RbacService,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        AppState {
            db,
            issuer: TokenIssuer::from_config(&config),
            rbac: RbacService::new(),
            config: Arc::new(config),
        }
    }
}

pub mod auth;
