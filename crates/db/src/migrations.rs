use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Applied and embedded migration counts, for readiness reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchemaState {
    pub applied: i64,
    pub expected: i64,
}

impl SchemaState {
    pub fn is_current(&self) -> bool {
        self.applied >= self.expected
    }
}

/// Fails when the migration ledger itself is missing.
pub async fn schema_state(pool: &DbPool) -> Result<SchemaState, sqlx::Error> {
    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    let expected = MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .count() as i64;
    Ok(SchemaState { applied, expected })
}
