//! PostgreSQL destination store.

use super::{DestinationError, DestinationStore, RefreshMode, RefreshSession};
use crate::database::{DatabaseMigrations, SqlValue};
use crate::query_builder::{quote_identifier, UpsertStatement};
use crate::source::redact_url;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone, PartialEq, Eq)]
pub struct PgDestinationSettings {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub run_migrations: bool,
}

impl std::fmt::Debug for PgDestinationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDestinationSettings")
            .field("url", &redact_url(&self.url))
            .field("max_connections", &self.max_connections)
            .field("connection_timeout", &self.connection_timeout)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

impl Default for PgDestinationSettings {
    fn default() -> Self {
        use crate::constants::defaults;
        Self {
            url: defaults::DESTINATION_URL.to_string(),
            max_connections: defaults::DESTINATION_MAX_CONNECTIONS,
            connection_timeout: Duration::from_secs(defaults::CONNECTION_TIMEOUT_SECONDS),
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgDestination {
    pool: PgPool,
}

impl PgDestination {
    /// Connect and, when configured, bring the schema up to date
    pub async fn connect(settings: &PgDestinationSettings) -> Result<Self, DestinationError> {
        info!(
            target_db = %redact_url(&settings.url),
            max_connections = settings.max_connections,
            "🗄️ Connecting to destination database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .acquire_timeout(settings.connection_timeout)
            .connect(&settings.url)
            .await
            .map_err(|e| DestinationError::Connection(e.to_string()))?;

        let destination = Self { pool };
        if settings.run_migrations {
            destination.run_migrations().await?;
        }
        Ok(destination)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), DestinationError> {
        DatabaseMigrations::run_all(&self.pool)
            .await
            .map_err(|e| DestinationError::Migration(e.to_string()))
    }
}

#[async_trait]
impl DestinationStore for PgDestination {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn begin_refresh(
        &self,
        table: &str,
        mode: RefreshMode,
    ) -> Result<Box<dyn RefreshSession>, DestinationError> {
        let quoted_table = quote_identifier(table)?;
        let connection = match mode {
            RefreshMode::DeleteThenInsert => SessionConnection::Autocommit(self.pool.clone()),
            RefreshMode::Atomic => {
                let tx = self.pool.begin().await.map_err(|e| {
                    DestinationError::Connection(format!("Failed to begin transaction: {e}"))
                })?;
                SessionConnection::Transaction(tx)
            }
        };

        debug!(table = table, mode = %mode, "Opened refresh session");
        Ok(Box::new(PgRefreshSession {
            table: table.to_string(),
            quoted_table,
            connection,
        }))
    }

    async fn ping(&self) -> Result<(), DestinationError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| DestinationError::from_sqlx("", e))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

enum SessionConnection {
    Autocommit(PgPool),
    Transaction(Transaction<'static, Postgres>),
}

struct PgRefreshSession {
    table: String,
    quoted_table: String,
    connection: SessionConnection,
}

impl PgRefreshSession {
    async fn execute(&mut self, query: Query<'_, Postgres, PgArguments>) -> Result<u64, DestinationError> {
        let result = match &mut self.connection {
            SessionConnection::Autocommit(pool) => query.execute(&*pool).await,
            SessionConnection::Transaction(tx) => query.execute(&mut **tx).await,
        };
        result
            .map(|r| r.rows_affected())
            .map_err(|e| DestinationError::from_sqlx(&self.table, e))
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Numeric(v) => query.bind(v.as_ref()),
        SqlValue::Text(v) => query.bind(v.as_deref()),
        SqlValue::Json(v) => query.bind(v.as_ref().map(Json)),
        SqlValue::Timestamp(v) => query.bind(*v),
        // Filtered out by check_writable before binding
        SqlValue::Unsupported(_) => query.bind(None::<String>),
    }
}

fn check_writable(statement: &UpsertStatement) -> Result<(), DestinationError> {
    for row in &statement.rows {
        for (index, value) in row.iter().enumerate() {
            if let SqlValue::Unsupported(reason) = value {
                return Err(DestinationError::UnsupportedValue {
                    table: statement.table.clone(),
                    column: statement.columns.get(index).cloned().unwrap_or_default(),
                    reason: reason.clone(),
                });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RefreshSession for PgRefreshSession {
    async fn delete_all(&mut self) -> Result<u64, DestinationError> {
        let sql = format!("DELETE FROM {}", self.quoted_table);
        self.execute(sqlx::query(&sql)).await
    }

    async fn upsert(&mut self, statement: &UpsertStatement) -> Result<u64, DestinationError> {
        check_writable(statement)?;
        let query = statement
            .binds()
            .fold(sqlx::query(&statement.sql), bind_value);
        self.execute(query).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DestinationError> {
        let PgRefreshSession { table, connection, .. } = *self;
        match connection {
            SessionConnection::Autocommit(_) => Ok(()),
            SessionConnection::Transaction(tx) => tx
                .commit()
                .await
                .map_err(|e| DestinationError::from_sqlx(&table, e)),
        }
    }

    async fn rollback(self: Box<Self>) -> Result<(), DestinationError> {
        let PgRefreshSession { table, connection, .. } = *self;
        match connection {
            SessionConnection::Autocommit(_) => Ok(()),
            SessionConnection::Transaction(tx) => tx
                .rollback()
                .await
                .map_err(|e| DestinationError::from_sqlx(&table, e)),
        }
    }
}
