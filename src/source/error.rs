//! # Source Errors
//!
//! Classified failures of a single remote operation against one source.
//! Classification drives retry (transient) versus immediate propagation
//! (permanent), and the failover coordinator's breaker bookkeeping.

use crate::database::PgErrorCode;
use crate::resilience::Retryable;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Network, TLS, or pool-level failure reaching the source
    #[error("Connection error on {source_name}: {message}")]
    Connection {
        source_name: String,
        message: String,
    },

    /// Client deadline or server statement timeout expired
    #[error("Timeout on {source_name} during {operation} after {timeout:?}")]
    Timeout {
        source_name: String,
        operation: String,
        timeout: Duration,
    },

    /// Source-reported condition expected to clear (overload, shutdown, protocol reset)
    #[error("Transient error on {source_name} [{code}]: {message}")]
    Transient {
        source_name: String,
        code: String,
        message: String,
    },

    #[error("Authentication failed on {source_name}: {message}")]
    Authentication {
        source_name: String,
        message: String,
    },

    /// Malformed query, missing function, decode failure and everything else permanent
    #[error("Query failed on {source_name}: {message}")]
    Query {
        source_name: String,
        code: Option<String>,
        message: String,
    },

    /// Missing or unusable connection information; the source is skipped
    #[error("Source {source_name} is not usable: {message}")]
    Configuration {
        source_name: String,
        message: String,
    },

    /// The engine is shutting down and no longer admits remote operations.
    /// Says nothing about the health of the source.
    #[error("Shutting down, {operation} on {source_name} not started")]
    ShuttingDown {
        source_name: String,
        operation: String,
    },
}

impl SourceError {
    pub fn source_name(&self) -> &str {
        match self {
            SourceError::Connection { source_name, .. }
            | SourceError::Timeout { source_name, .. }
            | SourceError::Transient { source_name, .. }
            | SourceError::Authentication { source_name, .. }
            | SourceError::Query { source_name, .. }
            | SourceError::Configuration { source_name, .. }
            | SourceError::ShuttingDown { source_name, .. } => source_name,
        }
    }

    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Connection { .. } => "connection",
            SourceError::Timeout { .. } => "timeout",
            SourceError::Transient { .. } => "transient",
            SourceError::Authentication { .. } => "authentication",
            SourceError::Query { .. } => "query",
            SourceError::Configuration { .. } => "configuration",
            SourceError::ShuttingDown { .. } => "shutting_down",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Connection { .. } | SourceError::Timeout { .. } | SourceError::Transient { .. }
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SourceError::Configuration { .. })
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, SourceError::ShuttingDown { .. })
    }

    pub fn shutting_down(source_name: &str, operation: &str) -> Self {
        SourceError::ShuttingDown {
            source_name: source_name.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn timeout(source_name: &str, operation: &str, timeout: Duration) -> Self {
        SourceError::Timeout {
            source_name: source_name.to_string(),
            operation: operation.to_string(),
            timeout,
        }
    }

    pub fn not_configured(source_name: &str, message: impl Into<String>) -> Self {
        SourceError::Configuration {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Classify a sqlx failure raised while talking to `source_name`.
    ///
    /// `acquire_timeout` is reported when the pool gives up waiting for a
    /// connection, `statement_timeout` when the server cancels the statement.
    pub fn from_sqlx(
        source_name: &str,
        err: sqlx::Error,
        acquire_timeout: Duration,
        statement_timeout: Duration,
    ) -> Self {
        let source_name = source_name.to_string();
        match err {
            sqlx::Error::Io(e) => SourceError::Connection {
                source_name,
                message: e.to_string(),
            },
            sqlx::Error::Tls(e) => SourceError::Connection {
                source_name,
                message: format!("tls: {e}"),
            },
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => SourceError::Connection {
                source_name,
                message: err.to_string(),
            },
            sqlx::Error::PoolTimedOut => SourceError::Timeout {
                source_name,
                operation: "acquire connection".to_string(),
                timeout: acquire_timeout,
            },
            sqlx::Error::Protocol(message) => SourceError::Transient {
                source_name,
                code: "protocol".to_string(),
                message,
            },
            sqlx::Error::Configuration(e) => SourceError::Configuration {
                source_name,
                message: e.to_string(),
            },
            sqlx::Error::Database(db_err) => Self::from_database(
                &source_name,
                db_err.code().map(|c| c.into_owned()),
                db_err.message().to_string(),
                statement_timeout,
            ),
            other => SourceError::Query {
                source_name,
                code: None,
                message: other.to_string(),
            },
        }
    }

    /// Classify an error the server reported with a SQLSTATE code
    pub fn from_database(
        source_name: &str,
        code: Option<String>,
        message: String,
        statement_timeout: Duration,
    ) -> Self {
        let source_name = source_name.to_string();
        match code.as_deref() {
            Some(c) if PgErrorCode::is_timeout(c) => SourceError::Timeout {
                source_name,
                operation: "statement".to_string(),
                timeout: statement_timeout,
            },
            Some(c) if PgErrorCode::is_transient(c) => SourceError::Transient {
                source_name,
                code: c.to_string(),
                message,
            },
            Some(c) if PgErrorCode::is_authentication_failure(c) => SourceError::Authentication {
                source_name,
                message,
            },
            _ => SourceError::Query {
                source_name,
                code,
                message,
            },
        }
    }
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        SourceError::is_transient(self)
    }
}
