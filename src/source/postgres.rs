//! PostgreSQL source connector.
//!
//! Keeps one lazily-connected pool per source. Pools are created on first use
//! and live for the process lifetime, so consecutive jobs reuse warm connections.
//!
//! Timeouts map onto the pool and session as follows:
//! - connection timeout → pool `acquire_timeout`
//! - command timeout → server-side `statement_timeout` (the executor adds a client deadline)
//! - keep-alive → pool `idle_timeout`, with a liveness test before each acquire

use super::{QueryParam, Source, SourceConnector, SourceError, SourceRow, SourceStatement};
use crate::database::SqlValue;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Timeouts and keep-alive applied to every source pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgSourceSettings {
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
    pub keep_alive: Duration,
}

impl Default for PgSourceSettings {
    fn default() -> Self {
        use crate::constants::defaults;
        Self {
            connection_timeout: Duration::from_secs(defaults::CONNECTION_TIMEOUT_SECONDS),
            command_timeout: Duration::from_secs(defaults::COMMAND_TIMEOUT_SECONDS),
            keep_alive: Duration::from_secs(defaults::KEEP_ALIVE_SECONDS),
        }
    }
}

#[derive(Debug, Default)]
pub struct PostgresConnector {
    settings: PgSourceSettings,
    pools: DashMap<String, PgPool>,
}

impl PostgresConnector {
    pub fn new(settings: PgSourceSettings) -> Self {
        Self {
            settings,
            pools: DashMap::new(),
        }
    }

    fn connect_options(&self, source: &Source) -> Result<PgConnectOptions, SourceError> {
        let info = source
            .connection
            .as_ref()
            .ok_or_else(|| SourceError::not_configured(&source.name, "no connection information"))?;

        let options = match &info.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| SourceError::not_configured(&source.name, format!("invalid url: {e}")))?,
            None => {
                if info.host.is_empty() || info.database.is_empty() {
                    return Err(SourceError::not_configured(
                        &source.name,
                        "host and database are required when no url is given",
                    ));
                }
                let options = PgConnectOptions::new()
                    .host(&info.host)
                    .port(info.port)
                    .database(&info.database)
                    .username(&info.username);
                match &info.password {
                    Some(password) => options.password(password),
                    None => options,
                }
            }
        };

        Ok(options
            .application_name("govsync")
            .options([(
                "statement_timeout",
                self.settings.command_timeout.as_millis().to_string(),
            )]))
    }

    fn pool_for(&self, source: &Source) -> Result<PgPool, SourceError> {
        if let Some(pool) = self.pools.get(&source.name) {
            return Ok(pool.clone());
        }

        let options = self.connect_options(source)?;
        let max_connections = source
            .connection
            .as_ref()
            .map(|c| c.max_connections)
            .unwrap_or(crate::constants::defaults::SOURCE_MAX_CONNECTIONS)
            .max(1);

        let pool = self
            .pools
            .entry(source.name.clone())
            .or_insert_with(|| {
                info!(
                    source = %source.name,
                    max_connections = max_connections,
                    "🔌 Creating source connection pool"
                );
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .min_connections(0)
                    .acquire_timeout(self.settings.connection_timeout)
                    .idle_timeout(Some(self.settings.keep_alive))
                    .test_before_acquire(true)
                    .connect_lazy_with(options)
            })
            .clone();

        Ok(pool)
    }

    fn classify(&self, source: &Source, err: sqlx::Error) -> SourceError {
        SourceError::from_sqlx(
            &source.name,
            err,
            self.settings.connection_timeout,
            self.settings.command_timeout,
        )
    }
}

#[async_trait]
impl SourceConnector for PostgresConnector {
    async fn fetch_rows(
        &self,
        source: &Source,
        statement: &SourceStatement,
    ) -> Result<Vec<SourceRow>, SourceError> {
        let pool = self.pool_for(source)?;

        let mut query = sqlx::query(&statement.sql);
        for param in &statement.params {
            query = match param {
                QueryParam::Int(v) => query.bind(*v),
                QueryParam::Text(v) => query.bind(v.as_str()),
                QueryParam::Bool(v) => query.bind(*v),
            };
        }

        let rows = query
            .fetch_all(&pool)
            .await
            .map_err(|e| self.classify(source, e))?;

        debug!(source = %source.name, rows = rows.len(), "Fetched source rows");
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn ping(&self, source: &Source) -> Result<(), SourceError> {
        let pool = self.pool_for(source)?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| self.classify(source, e))?;
        Ok(())
    }

    async fn close(&self) {
        let pools: Vec<(String, PgPool)> = self
            .pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (name, pool) in pools {
            debug!(source = %name, "Closing source pool");
            pool.close().await;
        }
    }
}

fn decode<'r, T>(row: &'r PgRow, index: usize, wrap: impl FnOnce(Option<T>) -> SqlValue) -> SqlValue
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(index) {
        Ok(value) => wrap(value),
        Err(e) => SqlValue::Unsupported(e.to_string()),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Convert a result row into an owned [`SourceRow`].
///
/// Columns of types we do not model are read as text without a type check,
/// which covers source-side enum types (e.g. vote choices); anything that still
/// fails becomes [`SqlValue::Unsupported`] and only fails mappers that read it.
fn decode_row(row: &PgRow) -> SourceRow {
    let mut out = SourceRow::new();
    for column in row.columns() {
        let index = column.ordinal();
        let value = match column.type_info().name() {
            "BOOL" => decode::<bool>(row, index, SqlValue::Bool),
            "INT2" => decode::<i16>(row, index, |v| SqlValue::Int(v.map(i64::from))),
            "INT4" => decode::<i32>(row, index, |v| SqlValue::Int(v.map(i64::from))),
            "INT8" => decode::<i64>(row, index, SqlValue::Int),
            "FLOAT4" => decode::<f32>(row, index, |v| SqlValue::Float(v.map(f64::from))),
            "FLOAT8" => decode::<f64>(row, index, SqlValue::Float),
            "NUMERIC" => decode::<BigDecimal>(row, index, SqlValue::Numeric),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => decode::<String>(row, index, SqlValue::Text),
            "JSON" | "JSONB" => decode::<JsonValue>(row, index, SqlValue::Json),
            "TIMESTAMPTZ" => decode::<DateTime<Utc>>(row, index, SqlValue::Timestamp),
            "TIMESTAMP" => decode::<NaiveDateTime>(row, index, |v| {
                SqlValue::Timestamp(v.map(|naive| naive.and_utc()))
            }),
            "UUID" => decode::<uuid::Uuid>(row, index, |v| SqlValue::Text(v.map(|u| u.to_string()))),
            "BYTEA" => decode::<Vec<u8>>(row, index, |v| SqlValue::Text(v.map(|b| to_hex(&b)))),
            other => match row.try_get_unchecked::<Option<String>, _>(index) {
                Ok(value) => SqlValue::Text(value),
                Err(e) => SqlValue::Unsupported(format!("{other}: {e}")),
            },
        };
        out.push(column.name(), value);
    }
    out
}
