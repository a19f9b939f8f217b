use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection};
use std::time::Duration;

use crate::config::Config;

/// Open the database connection pool from config.
///
/// An in-memory SQLite database exists per connection, so it gets a pool of
/// exactly one connection that is never recycled.
pub async fn connect(config: &Config) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut opts = ConnectOptions::new(&config.database_url);
    opts.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(config.is_dev());

    if is_memory_sqlite(&config.database_url) {
        opts.max_connections(1).min_connections(1);
    } else {
        opts.max_connections(100)
            .min_connections(5)
            .idle_timeout(Duration::from_secs(8))
            .max_lifetime(Duration::from_secs(8));
    }

    SeaDatabase::connect(opts).await
}

fn is_memory_sqlite(url: &str) -> bool {
    url.starts_with("sqlite") && url.contains(":memory:")
}
