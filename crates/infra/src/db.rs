//! Connection pool construction and migration bootstrap for Postgres-backed deployments.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Open a pool sized for a single API instance.
///
/// `max_connections` mirrors the teacher's rule of thumb of a handful of
/// connections per instance, leaving headroom for the connection limit to
/// be shared across the event store, projections, sequencer, and auth stores
/// that all borrow this same pool.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Apply every migration under `crates/infra/migrations/` that hasn't run yet.
///
/// Safe to call on every startup: `sqlx::migrate!` records applied versions in
/// its own bookkeeping table and is a no-op once the schema is current.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
