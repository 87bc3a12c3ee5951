use crate::error::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub type DbPool = PgPool;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Connection string safe for logs: credentials are replaced, host and
/// database are kept.
pub fn redact_database_url(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((credentials, location)) => {
            let scheme = credentials
                .split_once("://")
                .map(|(scheme, _)| scheme)
                .unwrap_or("postgres");
            format!("{}://<hidden>@{}", scheme, location)
        }
        None => url.to_string(),
    }
}
