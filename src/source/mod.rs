//! # Remote Sources
//!
//! Everything on the read side of a sync: the configured read replicas, the
//! requests issued against them, and the components that execute those requests
//! resiliently.
//!
//! ## Key Components
//!
//! - [`Source`] / [`SourceRegistry`] - configuration-owned replicas in failover order
//! - [`FetchRequest`] - query text, parameters and the typed row mapper
//! - [`connector`] - the transport seam ([`SourceConnector`]) and its PostgreSQL implementation
//! - [`executor`] - one query against one source with deadline, throttle and retries
//! - [`failover`] - priority-ordered execution across sources with circuit breaking

pub mod connector;
pub mod error;
pub mod executor;
pub mod failover;
pub mod postgres;
pub mod row;

pub use connector::SourceConnector;
pub use error::SourceError;
pub use executor::{QueryExecutor, QueryTimeouts};
pub use failover::{FailoverCoordinator, FailoverError, FailoverSettings};
pub use postgres::PostgresConnector;
pub use row::{MappingError, SourceRow};

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Connection information for one read replica
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub max_connections: u32,
    /// Full URL, preferred over the discrete fields when present
    #[serde(skip_serializing)]
    pub url: Option<String>,
}

impl ConnectionInfo {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            host: String::new(),
            port: crate::constants::defaults::SOURCE_PORT,
            database: String::new(),
            username: String::new(),
            password: None,
            max_connections: crate::constants::defaults::SOURCE_MAX_CONNECTIONS,
            url: Some(url.into()),
        }
    }

    /// Host/database description safe for logs
    pub fn describe(&self) -> String {
        match &self.url {
            Some(url) => redact_url(url),
            None => format!("{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("target", &self.describe())
            .field("username", &self.username)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Strip credentials from a connection URL
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

/// A configured read replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub name: String,
    pub connection: Option<ConnectionInfo>,
    /// Lower ranks are tried first when no explicit failover order is configured
    pub priority_rank: u32,
}

impl Source {
    pub fn new(name: impl Into<String>, connection: Option<ConnectionInfo>, priority_rank: u32) -> Self {
        Self {
            name: name.into(),
            connection,
            priority_rank,
        }
    }

    pub fn with_url(name: impl Into<String>, url: impl Into<String>, priority_rank: u32) -> Self {
        Self::new(name, Some(ConnectionInfo::from_url(url)), priority_rank)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_configured(&self) -> bool {
        self.connection.is_some()
    }
}

/// Sources in the order the failover coordinator consults them.
///
/// Fixed at process start. Sources without connection information are dropped
/// here, logged once, and never attempted.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    ordered: Vec<Source>,
}

impl SourceRegistry {
    /// Build the ordered list.
    ///
    /// With an explicit `failover_order`, sources appear in that order; names
    /// missing from `sources` and sources missing from the order are skipped. Without one, every source is ordered by
    /// `priority_rank`, then name.
    pub fn new(mut sources: Vec<Source>, failover_order: &[String]) -> Self {
        let candidates: Vec<Source> = if failover_order.is_empty() {
            sources.sort_by(|a, b| {
                a.priority_rank
                    .cmp(&b.priority_rank)
                    .then_with(|| a.name.cmp(&b.name))
            });
            sources
        } else {
            for name in omitted_from_order(&sources, failover_order) {
                warn!(source = %name, "⚠️ Source not named in failover order, skipping");
            }
            failover_order
                .iter()
                .filter_map(|name| {
                    let found = sources.iter().find(|s| &s.name == name).cloned();
                    if found.is_none() {
                        warn!(source = %name, "⚠️ Failover order names an unknown source, skipping");
                    }
                    found
                })
                .collect()
        };

        let ordered = candidates
            .into_iter()
            .filter(|source| {
                if !source.is_configured() {
                    warn!(source = %source.name, "⚠️ Source has no connection information, skipping");
                }
                source.is_configured()
            })
            .collect();

        Self { ordered }
    }

    pub fn ordered(&self) -> &[Source] {
        &self.ordered
    }

    pub fn primary(&self) -> Option<&Source> {
        self.ordered.first()
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.ordered.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Bind parameter for a source query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryParam {
    Int(i64),
    Text(String),
    Bool(bool),
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        QueryParam::Int(value)
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        QueryParam::Text(value)
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        QueryParam::Text(value.to_string())
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        QueryParam::Bool(value)
    }
}

/// Query text plus positional parameters, without a mapper
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

/// Typed row mapper supplied per dataset
pub type RowMapper<T> = Arc<dyn Fn(&SourceRow) -> Result<T, MappingError> + Send + Sync>;

/// One parameterized query and the mapper turning its rows into records
pub struct FetchRequest<T> {
    label: String,
    statement: SourceStatement,
    mapper: RowMapper<T>,
}

impl<T> FetchRequest<T> {
    /// `label` names the operation in logs and errors, e.g. `get_totals`
    pub fn new<F>(label: impl Into<String>, sql: impl Into<String>, mapper: F) -> Self
    where
        F: Fn(&SourceRow) -> Result<T, MappingError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            statement: SourceStatement {
                sql: sql.into(),
                params: Vec::new(),
            },
            mapper: Arc::new(mapper),
        }
    }

    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.statement.params.push(param.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn statement(&self) -> &SourceStatement {
        &self.statement
    }

    pub fn map_row(&self, row: &SourceRow) -> Result<T, MappingError> {
        (self.mapper)(row)
    }
}

impl<T> Clone for FetchRequest<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            statement: self.statement.clone(),
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl<T> fmt::Debug for FetchRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("label", &self.label)
            .field("statement", &self.statement)
            .finish_non_exhaustive()
    }
}

/// Configured sources an explicit failover order leaves out
fn omitted_from_order<'a>(sources: &'a [Source], failover_order: &[String]) -> Vec<&'a str> {
    sources
        .iter()
        .filter(|source| !failover_order.contains(&source.name))
        .map(|source| source.name.as_str())
        .collect()
}
