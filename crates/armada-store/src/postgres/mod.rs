//! PostgreSQL-backed repositories.
//!
//! Each store takes an injected [`PgPool`] (no global pool state); sqlx
//! acquires a pooled connection per call and releases it on every exit
//! path. Mutations that must not lose concurrent updates are written as
//! single conditional UPDATE statements, and the job-claim protocol runs
//! `SELECT ... FOR UPDATE SKIP LOCKED` inside one transaction.

mod assignments;
mod jobs;
mod overrides;
mod robots;
mod rows;

pub use assignments::PgAssignmentStore;
pub use jobs::PgJobStore;
pub use overrides::PgOverrideStore;
pub use robots::PgRobotStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect a pool suitable for the orchestrator's stores.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
  PgPoolOptions::new()
    .max_connections(10)
    .connect(database_url)
    .await
}

/// Run database migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
  sqlx::migrate!("../../migrations").run(pool).await
}
