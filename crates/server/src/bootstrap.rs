use std::sync::Arc;

use axum::Router;
use reqflow_core::config::{AppConfig, ConfigError, LoadOptions};
use reqflow_core::notify::{NoopNotifier, Notifier};
use reqflow_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::api::{self, AppState};
use crate::audit::TracingAuditSink;
use crate::health;
use crate::notifier::WebhookNotifier;
use crate::service::{Repositories, RequisitionService};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

impl Application {
    /// API routes plus the unauthenticated health check.
    pub fn router(&self) -> Router {
        api::router(self.state.clone()).merge(health::router(self.db_pool.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification client setup failed: {0}")]
    Notifier(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        requisition_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        requisition_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        requisition_id = "unknown",
        "database migrations applied"
    );

    let notifier: Arc<dyn Notifier> =
        match WebhookNotifier::from_config(&config.notifications).map_err(BootstrapError::Notifier)? {
            Some(webhook) => Arc::new(webhook),
            None => Arc::new(NoopNotifier),
        };
    info!(
        event_name = "system.bootstrap.notifications_configured",
        correlation_id = "bootstrap",
        requisition_id = "unknown",
        notifications_enabled = config.notifications.enabled,
        "notification transport initialized"
    );

    let service = RequisitionService::new(Repositories::sql(db_pool.clone()), config.workflow.clone())
        .with_audit_sink(Arc::new(TracingAuditSink))
        .with_notifier(notifier);

    Ok(Application { config, db_pool, state: AppState::new(service) })
}
