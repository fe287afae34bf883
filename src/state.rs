use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::create_pool;
use crate::error::{AppError, AppResult};
use crate::repository::postgres::PgBillingStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, sqlx::Error> {
        let db_pool = create_pool(&config)?;
        Ok(Self {
            config: Arc::new(config),
            db_pool,
        })
    }

    /// Billing store over the shared pool.
    pub fn store(&self) -> AppResult<PgBillingStore> {
        self.db_pool
            .as_ref()
            .map(|pool| PgBillingStore::new(pool.clone()))
            .ok_or_else(|| {
                AppError::Dependency(
                    "Database is not configured. Set DATABASE_URL.".to_string(),
                )
            })
    }
}
