//! # Destination Migrations
//!
//! Creates the destination tables and their conflict-key constraints.
//!
//! Migrations live in `migrations/` using the `YYYYMMDDHHMMSS_description.sql`
//! naming convention and are embedded into the binary by `sqlx::migrate!`, so a
//! deployed binary never depends on the working directory. The sqlx migrator
//! takes a PostgreSQL advisory lock, so several sync processes starting at once
//! apply each migration exactly once.

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Applies destination schema migrations.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Run all outstanding migrations in order
    pub async fn run_all(pool: &PgPool) -> Result<(), MigrateError> {
        let known = MIGRATOR.iter().count();
        info!(migrations = known, "🗄️ Applying destination migrations");
        MIGRATOR.run(pool).await?;
        info!("✅ Destination schema up to date");
        Ok(())
    }

    /// Versions embedded in this binary, oldest first
    pub fn embedded_versions() -> Vec<i64> {
        MIGRATOR.iter().map(|m| m.version).collect()
    }
}
