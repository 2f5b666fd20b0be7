//! Postgres connectivity for the declaration workspace. Pool sizing
//! comes from `DatabaseConfig`, the connection URL from the service's
//! `ServiceConfig`; readiness is defined by the rule catalog, since a
//! service with empty reference tables can neither classify events nor
//! run the engine.

use anyhow::Context;
use common::config::{DatabaseConfig, ServiceConfig};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

pub async fn connect(config: &ServiceConfig) -> anyhow::Result<PgPool> {
    let sizing = DatabaseConfig::default();

    let pool = PgPoolOptions::new()
        .max_connections(sizing.max_connections)
        .min_connections(sizing.min_connections)
        .acquire_timeout(Duration::from_secs(sizing.connection_timeout))
        .connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to the {} database", config.name))?;

    info!("Connected to {} database", config.name);
    Ok(pool)
}

/// Liveness probe behind the health endpoint.
pub async fn check_database_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}

/// Readiness probe: the declaration pipeline rejects events whose type
/// is not in the catalog, so an unseeded logical-field table means no
/// request can succeed yet.
pub async fn check_catalog_seeded(pool: &PgPool) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM logical_fields")
        .fetch_one(pool)
        .await
        .map(|fields| fields > 0)
        .unwrap_or(false)
}
