//! # Query Builder
//!
//! SQL generation for the destination side of a sync.
//!
//! Refreshing a table writes its snapshot in chunks, each chunk as a single
//! parameterized multi-row upsert:
//!
//! ```sql
//! INSERT INTO "totals" ("epoch_no", "treasury") VALUES ($1, $2), ($3, $4)
//! ON CONFLICT ("epoch_no") DO UPDATE SET "treasury" = EXCLUDED."treasury"
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use govsync_core::query_builder::UpsertBuilder;
//!
//! let statement = UpsertBuilder::new("totals")
//!     .columns(&["epoch_no", "treasury"])
//!     .conflict_keys(&["epoch_no"])
//!     .row(vec![10_i64.into(), "1000".into()])
//!     .build()
//!     .unwrap();
//! assert_eq!(statement.bind_count(), 2);
//! ```

pub mod upsert;

pub use upsert::{
    max_rows_per_statement, quote_identifier, QueryBuilderError, UpsertBuilder, UpsertStatement,
};
