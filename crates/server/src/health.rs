//! Unauthenticated readiness check: the database answers and its schema is
//! at the version this binary embeds.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use reqflow_db::migrations::schema_state;
use reqflow_db::{ping, DbPool};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessCheck {
    pub status: Readiness,
    pub detail: String,
}

impl ReadinessCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Degraded, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub database: ReadinessCheck,
    pub schema: ReadinessCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let database = match ping(&state.db_pool).await {
        Ok(()) => ReadinessCheck::ready("database answered"),
        Err(error) => ReadinessCheck::degraded(format!("database query failed: {error}")),
    };
    let schema = if database.status == Readiness::Ready {
        schema_check(&state.db_pool).await
    } else {
        ReadinessCheck { status: Readiness::Skipped, detail: "database unreachable".to_string() }
    };

    let ready = database.status == Readiness::Ready && schema.status == Readiness::Ready;
    let report = HealthReport {
        status: if ready { Readiness::Ready } else { Readiness::Degraded },
        database,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(report))
}

async fn schema_check(pool: &DbPool) -> ReadinessCheck {
    match schema_state(pool).await {
        Ok(state) if state.is_current() => ReadinessCheck::ready(format!(
            "{} of {} migrations applied",
            state.applied, state.expected
        )),
        Ok(state) => ReadinessCheck::degraded(format!(
            "{} of {} migrations applied; requisition tables may be missing",
            state.applied, state.expected
        )),
        Err(error) => ReadinessCheck::degraded(format!("migration ledger unreadable: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use reqflow_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState, Readiness};

    #[tokio::test]
    async fn migrated_database_is_ready() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, Readiness::Ready);
        assert_eq!(report.schema.detail, "2 of 2 migrations applied");

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_database_is_degraded() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.database.status, Readiness::Ready);
        assert_eq!(report.schema.status, Readiness::Degraded);

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_skips_the_schema_check() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        pool.close().await;

        let (status, Json(report)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, Readiness::Degraded);
        assert_eq!(report.database.status, Readiness::Degraded);
        assert_eq!(report.schema.status, Readiness::Skipped);
    }
}
