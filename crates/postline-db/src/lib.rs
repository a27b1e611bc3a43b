//! Store layer for Postline.
//!
//! Provides the `JobStore` and `ScheduleStore` traits, their PostgreSQL
//! implementations, and in-memory implementations for tests and local
//! development.

pub mod error;
pub mod job;
pub mod memory;
pub mod schedule;

pub use error::{DbError, DbResult};
pub use job::{JobFilter, JobStore, PgJobStore};
pub use memory::{MemoryJobStore, MemoryScheduleStore};
pub use schedule::{PgScheduleStore, ScheduleStore};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
