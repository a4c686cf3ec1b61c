//! # Database Primitives
//!
//! Shared PostgreSQL plumbing used on both sides of the sync: typed column values,
//! SQLSTATE classification and the destination schema migrations.
//!
//! ## Key Components
//!
//! - [`value`] - Owned, typed column values ([`SqlValue`])
//! - [`error_codes`] - SQLSTATE constants and transient/permanent classification
//! - [`migrations`] - Destination table migrations embedded at compile time

pub mod error_codes;
pub mod migrations;
pub mod value;

pub use error_codes::PgErrorCode;
pub use migrations::DatabaseMigrations;
pub use value::SqlValue;
