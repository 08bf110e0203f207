//! `PostgreSQL` request ledger for callback correlation.
//!
//! This crate provides a production [`LedgerStore`] backed by `PostgreSQL`.
//! Reservation relies on the table's primary key: `INSERT ... ON CONFLICT DO
//! NOTHING` inserts exactly one row no matter how many instances race on the
//! same request id, and the loser sees zero affected rows.
//!
//! # Example
//!
//! ```ignore
//! use callback_correlation_postgres::{PostgresLedgerConfig, PostgresLedgerStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PostgresLedgerConfig::from_env().connect().await?;
//!     let ledger = PostgresLedgerStore::new(pool);
//!     ledger.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use callback_correlation_core::{
    CorrelationKey, LedgerError, LedgerStore, OwnerContext, PendingRequest, RequestStatus,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{PgPool, Row};

/// Connection settings loaded from the environment
pub mod config;

pub use config::PostgresLedgerConfig;

/// `PostgreSQL`-backed [`LedgerStore`].
#[derive(Clone, Debug)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Create a ledger store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and create a ledger store.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("Migration failed: {e}")))?;
        tracing::info!("Request ledger migrations applied");
        Ok(())
    }
}

fn storage_error(operation: &'static str, error: &sqlx::Error) -> LedgerError {
    tracing::error!(operation, error = %error, "Request ledger query failed");
    metrics::counter!("correlation_ledger_errors_total", "operation" => operation).increment(1);
    LedgerError::Storage(error.to_string())
}

impl LedgerStore for PostgresLedgerStore {
    fn insert_if_absent<'a>(
        &'a self,
        request: &'a PendingRequest,
    ) -> BoxFuture<'a, Result<bool, LedgerError>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                INSERT INTO request_ledger (
                    request_id, requester_id, destination_id, transaction_id, status, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (request_id) DO NOTHING
                ",
            )
            .bind(request.id.as_str())
            .bind(&request.owner.requester_id)
            .bind(&request.owner.destination_id)
            .bind(request.owner.transaction_id.as_deref())
            .bind(request.status.as_str())
            .bind(request.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("insert", &e))?;

            let inserted = result.rows_affected() == 1;
            tracing::debug!(correlation_key = %request.id, inserted, "Ledger insert");
            Ok(inserted)
        })
    }

    fn update_status<'a>(
        &'a self,
        id: &'a CorrelationKey,
        status: RequestStatus,
    ) -> BoxFuture<'a, Result<(), LedgerError>> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE request_ledger
                SET status = $2, updated_at = now()
                WHERE request_id = $1
                ",
            )
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("update_status", &e))?;

            if result.rows_affected() == 0 {
                return Err(LedgerError::NotFound(id.clone()));
            }
            Ok(())
        })
    }

    fn find<'a>(
        &'a self,
        id: &'a CorrelationKey,
    ) -> BoxFuture<'a, Result<Option<PendingRequest>, LedgerError>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT request_id, requester_id, destination_id, transaction_id, status, created_at
                FROM request_ledger
                WHERE request_id = $1
                ",
            )
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("find", &e))?;

            let Some(row) = row else {
                return Ok(None);
            };

            let status: String = row.get("status");
            let created_at: DateTime<Utc> = row.get("created_at");
            let transaction_id: Option<String> = row.get("transaction_id");
            let mut owner = OwnerContext::new(
                row.get::<String, _>("requester_id"),
                row.get::<String, _>("destination_id"),
            );
            owner.transaction_id = transaction_id;

            Ok(Some(PendingRequest {
                id: CorrelationKey::new(row.get::<String, _>("request_id")),
                created_at,
                owner,
                status: RequestStatus::parse(&status)?,
            }))
        })
    }
}
