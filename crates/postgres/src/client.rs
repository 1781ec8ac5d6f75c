//! Postgres pool wrapper.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use sync_core::{DbErrorCode, Error, Result};
use tracing::info;

use crate::config::PostgresConfig;

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE class prefixes for data exceptions and integrity violations.
const DATA_EXCEPTION_CLASS: &str = "22";
const INTEGRITY_VIOLATION_CLASS: &str = "23";

/// Postgres-backed store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresStore {
    /// Opens the pool and, unless disabled, creates the schema.
    pub async fn connect(config: PostgresConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| Error::config(format!("invalid postgres url: {}", e)))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(|e| db_error(e, DbErrorCode::QueryFailed, "connect"))?;

        info!(
            max_connections = config.max_connections,
            "Connected to Postgres"
        );

        let store = Self { pool, config };
        if store.config.init_schema {
            crate::health::init_schema(&store).await?;
        }
        Ok(store)
    }

    /// Wraps an existing pool without touching the schema.
    pub fn from_pool(pool: PgPool, config: PostgresConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

/// Map a sqlx error onto the store error codes.
///
/// Unique violations keep their own code so callers can treat them as
/// a benign race with another writer. Other integrity and data errors
/// fail identically on every attempt and are not retried.
pub(crate) fn db_error(err: sqlx::Error, kind: DbErrorCode, context: &str) -> Error {
    let sqlstate = err
        .as_database_error()
        .and_then(|d| d.code())
        .map(|code| code.into_owned());
    let kind = classify_sqlstate(sqlstate.as_deref(), kind);
    Error::database(kind, format!("{}: {}", context, err))
}

fn classify_sqlstate(sqlstate: Option<&str>, fallback: DbErrorCode) -> DbErrorCode {
    match sqlstate {
        Some(UNIQUE_VIOLATION) => DbErrorCode::UniqueViolation,
        Some(code)
            if code.starts_with(INTEGRITY_VIOLATION_CLASS)
                || code.starts_with(DATA_EXCEPTION_CLASS) =>
        {
            DbErrorCode::ConstraintViolation
        }
        _ => fallback,
    }
}
