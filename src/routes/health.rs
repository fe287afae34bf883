use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::state::AppState;

const DB_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    // Every billing route needs the database, so running without one is
    // reported as degraded rather than skipped.
    let db_ok = match &state.db_pool {
        Some(pool) => database_reachable(pool).await,
        None => false,
    };

    let status = if db_ok { "ok" } else { "degraded" };
    Json(json!({
        "status": status,
        "service": state.config.app_name,
        "environment": state.config.environment,
        "now": Utc::now().to_rfc3339(),
        "db": db_ok,
        "scheduler": state.config.billing_scheduler_enabled,
    }))
}

// Bounded so the check answers quickly even while the lazy pool is still
// trying to open its first connection.
async fn database_reachable(pool: &PgPool) -> bool {
    match tokio::time::timeout(DB_CHECK_TIMEOUT, sqlx::query("SELECT 1").fetch_one(pool)).await {
        Ok(Ok(_)) => true,
        Ok(Err(error)) => {
            tracing::error!(error = %error, "Health check DB query failed");
            false
        }
        Err(_) => {
            tracing::error!(
                timeout_seconds = DB_CHECK_TIMEOUT.as_secs(),
                "Health check DB query timed out"
            );
            false
        }
    }
}
