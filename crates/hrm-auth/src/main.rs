//! # hrm-auth server
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/hrm JWT_SECRET=... REFRESH_TOKEN_SECRET=... hrm-auth
//! hrm-auth --migrate          # apply migrations and exit
//! hrm-auth --rollback 2       # roll back two migrations and exit
//! ```
//!
//! ## Endpoints
//!
//! - `POST /api/auth/sign-in`, `/refresh-token`, `/logout`, `/logout-all`, `/change-password`
//! - `GET /api/auth/me`
//! - `GET /api-docs` — Scalar OpenAPI UI

use hrm_auth::{logging, App, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    logging::init_logging(&config);

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--migrate" || a == "--rollback") {
        let db = hrm_auth::db::connect(&config).await?;
        App::run_db_command(&db, &args).await?;
        return Ok(());
    }

    let app = App::with_config(config).await?;
    app.run().await?;

    Ok(())
}
