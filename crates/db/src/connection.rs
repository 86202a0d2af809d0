use std::time::Duration;

use reqflow_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let url = normalize_url(database_url);
    // Each in-memory connection is its own database; keep a single one alive.
    let in_memory = url.contains(":memory:");
    let max_connections = if in_memory { 1 } else { max_connections.max(1) };

    let mut options = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    if in_memory {
        options = options.min_connections(1).idle_timeout(None).max_lifetime(None);
    }

    options
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&url)
        .await
}

/// Round-trips a trivial query; used by health and doctor checks.
pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

fn normalize_url(database_url: &str) -> String {
    let trimmed = database_url.trim();
    if trimmed == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    if trimmed.starts_with("sqlite://") && !trimmed.contains(":memory:") && !trimmed.contains('?')
    {
        return format!("{trimmed}?mode=rwc");
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, normalize_url, ping};

    #[test]
    fn file_urls_are_created_on_demand() {
        assert_eq!(normalize_url("sqlite://reqflow.db"), "sqlite://reqflow.db?mode=rwc");
        assert_eq!(normalize_url("sqlite://reqflow.db?mode=ro"), "sqlite://reqflow.db?mode=ro");
        assert_eq!(normalize_url(":memory:"), "sqlite::memory:");
        assert_eq!(normalize_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn in_memory_pool_answers_ping() {
        let pool = connect_with_settings("sqlite::memory:", 8, 5).await.expect("connect");

        ping(&pool).await.expect("ping");
        assert_eq!(pool.options().get_max_connections(), 1);
    }
}
