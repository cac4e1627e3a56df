use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;

use loa_core::config::AppConfig;
use loa_core::org::InMemoryOrgLookup;
use loa_db::repositories::{
    SqlActionIdempotencyRepository, SqlAuditLogRepository, SqlTierRepository,
    SqlTransactionRepository,
};
use loa_db::{connect_with_settings, migrations, DbPool};

use crate::api::ApiState;
use crate::service::WorkflowService;

pub struct App {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api_state: ApiState,
}

/// Connect the pool, apply pending migrations, and wire the workflow
/// service onto the SQL repositories.
pub async fn bootstrap_with_config(config: AppConfig) -> anyhow::Result<App> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .with_context(|| format!("could not connect to database `{}`", config.database.url))?;

    migrations::run_pending(&db_pool).await.context("could not apply pending migrations")?;

    let service = WorkflowService::new(
        Arc::new(SqlTierRepository::new(db_pool.clone())),
        Arc::new(SqlTransactionRepository::new(db_pool.clone())),
        Arc::new(SqlAuditLogRepository::new(db_pool.clone())),
        Arc::new(SqlActionIdempotencyRepository::new(db_pool.clone())),
        // Directory integration is deployment-specific; the default build
        // ships the in-memory lookup and falls back to raw ids.
        Arc::new(InMemoryOrgLookup::default()),
        config.audit.signing_key.expose_secret().as_bytes(),
    );

    let api_state =
        ApiState { service: Arc::new(service), admin_token: config.server.admin_token.clone() };

    Ok(App { config, db_pool, api_state })
}
