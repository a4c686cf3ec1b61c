//! PostgreSQL Error Codes
//!
//! Provides constants for PostgreSQL SQLSTATE error codes used to classify
//! source failures as transient (retry, then trip the breaker) or permanent
//! (propagate immediately).
//!
//! ## SQLSTATE Format
//!
//! - 5-character codes representing error classes and conditions
//! - First 2 characters: error class
//! - Last 3 characters: specific condition
//!
//! ## Reference
//!
//! Full list: <https://www.postgresql.org/docs/current/errcodes-appendix.html>

/// PostgreSQL SQLSTATE error codes
///
/// Only codes the sync engine actually branches on are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    // =========================================================================
    // Class 08: Connection Exception
    // =========================================================================

    /// Connection exception class prefix
    pub const CONNECTION_EXCEPTION_CLASS: &'static str = "08";

    // =========================================================================
    // Class 21: Cardinality Violation
    // =========================================================================

    /// Cardinality violation - Code 21000
    ///
    /// Raised when one `ON CONFLICT DO UPDATE` statement hits the same key twice.
    pub const CARDINALITY_VIOLATION: &'static str = "21000";

    // =========================================================================
    // Class 23: Integrity Constraint Violation
    // =========================================================================

    /// Unique violation - Code 23505
    pub const UNIQUE_VIOLATION: &'static str = "23505";

    // =========================================================================
    // Class 28: Invalid Authorization Specification
    // =========================================================================

    /// Invalid authorization specification - Code 28000
    pub const INVALID_AUTHORIZATION: &'static str = "28000";

    /// Invalid password - Code 28P01
    pub const INVALID_PASSWORD: &'static str = "28P01";

    // =========================================================================
    // Class 40: Transaction Rollback
    // =========================================================================

    /// Serialization failure - Code 40001
    pub const SERIALIZATION_FAILURE: &'static str = "40001";

    /// Deadlock detected - Code 40P01
    pub const DEADLOCK_DETECTED: &'static str = "40P01";

    // =========================================================================
    // Class 42: Syntax Error or Access Rule Violation
    // =========================================================================

    /// Undefined function - Code 42883
    ///
    /// Usually means the configured schema does not expose the dataset function.
    pub const UNDEFINED_FUNCTION: &'static str = "42883";

    // =========================================================================
    // Class 53: Insufficient Resources
    // =========================================================================

    /// Too many connections - Code 53300
    ///
    /// Replicas commonly answer with this under load; always worth a retry.
    pub const TOO_MANY_CONNECTIONS: &'static str = "53300";

    /// Insufficient resources class prefix
    pub const INSUFFICIENT_RESOURCES_CLASS: &'static str = "53";

    // =========================================================================
    // Class 57: Operator Intervention
    // =========================================================================

    /// Query canceled - Code 57014 (statement_timeout lands here)
    pub const QUERY_CANCELED: &'static str = "57014";

    /// Admin shutdown - Code 57P01
    pub const ADMIN_SHUTDOWN: &'static str = "57P01";

    /// Crash shutdown - Code 57P02
    pub const CRASH_SHUTDOWN: &'static str = "57P02";

    /// Cannot connect now - Code 57P03
    pub const CANNOT_CONNECT_NOW: &'static str = "57P03";

    // =========================================================================
    // Helper Methods
    // =========================================================================

    /// Whether the source reported a condition that may clear on its own
    #[inline]
    pub fn is_transient(code: &str) -> bool {
        code.starts_with(Self::CONNECTION_EXCEPTION_CLASS)
            || code.starts_with(Self::INSUFFICIENT_RESOURCES_CLASS)
            || matches!(
                code,
                Self::SERIALIZATION_FAILURE
                    | Self::DEADLOCK_DETECTED
                    | Self::ADMIN_SHUTDOWN
                    | Self::CRASH_SHUTDOWN
                    | Self::CANNOT_CONNECT_NOW
            )
    }

    /// Whether the statement was cancelled by a server-side timeout
    #[inline]
    pub fn is_timeout(code: &str) -> bool {
        code == Self::QUERY_CANCELED
    }

    /// Whether the source rejected our credentials
    #[inline]
    pub fn is_authentication_failure(code: &str) -> bool {
        code == Self::INVALID_AUTHORIZATION || code == Self::INVALID_PASSWORD
    }
}
