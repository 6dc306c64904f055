use std::sync::Arc;

use financia_core::config::{AppConfig, ConfigError, LoadOptions};
use financia_db::repositories::{
    GroupRepository, OrderRepository, PlanRepository, ProductRepository, SqlGroupRepository,
    SqlOrderRepository, SqlPlanRepository, SqlProductRepository,
};
use financia_db::{connect, migrations, DbPool};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

/// Shared handler state: repository handles plus the quoting defaults the
/// financing routes need.
#[derive(Clone)]
pub struct AppState {
    pub plans: Arc<dyn PlanRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub default_down_pct: Decimal,
}

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let state = AppState {
        plans: Arc::new(SqlPlanRepository::new(db_pool.clone())),
        groups: Arc::new(SqlGroupRepository::new(db_pool.clone())),
        products: Arc::new(SqlProductRepository::new(db_pool.clone())),
        orders: Arc::new(SqlOrderRepository::new(db_pool.clone())),
        default_down_pct: config.quoting.default_down_pct,
    };

    Ok(Application { config, db_pool, state })
}
