//! Postgres health checks and schema bootstrap.

use sync_core::{DbErrorCode, Result};
use tracing::{debug, error};

use crate::client::{db_error, PostgresStore};
use crate::schema::all_statements;

/// Check Postgres connection health.
pub async fn check_connection(store: &PostgresStore) -> bool {
    match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(store.pool())
        .await
    {
        Ok(_) => {
            debug!("Postgres connection healthy");
            true
        }
        Err(e) => {
            error!("Postgres health check failed: {}", e);
            false
        }
    }
}

/// Create every table, view and index that is missing.
pub async fn init_schema(store: &PostgresStore) -> Result<()> {
    for ddl in all_statements() {
        sqlx::query(ddl)
            .execute(store.pool())
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "failed to execute DDL"))?;
    }

    debug!("Postgres schema initialized");
    Ok(())
}
