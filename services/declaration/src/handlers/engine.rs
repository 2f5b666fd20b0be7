//! Engine runs on demand. The dry-run endpoint computes a full outcome
//! without persisting anything; declaration generation reuses the same
//! snapshot-then-run helper.

use axum::{extract::State, Json};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use common::ServiceResult;

use crate::engine::{self, RunOptions, RunOutcome};
use crate::store;
use crate::AppState;

/// Fetches the run inputs (events, rules, vocabulary) as snapshots and
/// executes the engine synchronously.
pub(crate) async fn run_for_taxpayer(
    pool: &PgPool,
    taxpayer_id: Uuid,
    tax_year: i32,
    allow_empty: bool,
) -> ServiceResult<RunOutcome> {
    let events = store::events::by_taxpayer_year(pool, taxpayer_id, tax_year).await?;
    let rules = store::catalog::active_rules_for_year(pool, tax_year).await?;
    let vocabulary = store::catalog::vocabulary(pool).await?;

    let options = RunOptions { tax_year, allow_empty };
    let outcome = engine::run(&events, &rules, &vocabulary, &options)?;

    tracing::debug!(
        taxpayer = %taxpayer_id,
        tax_year,
        fields = outcome.field_values.len(),
        mappings = outcome.stats.mappings_created,
        excluded = outcome.stats.events_excluded,
        "engine run finished"
    );
    Ok(outcome)
}

#[derive(Debug, Deserialize)]
pub struct RunEngineRequest {
    pub taxpayer_id: Uuid,
    pub tax_year: i32,
    #[serde(default)]
    pub allow_empty: bool,
}

pub async fn run_engine(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunEngineRequest>,
) -> ServiceResult<Json<RunOutcome>> {
    store::taxpayers::require(&state.db, payload.taxpayer_id).await?;
    let outcome = run_for_taxpayer(
        &state.db,
        payload.taxpayer_id,
        payload.tax_year,
        payload.allow_empty,
    )
    .await?;
    Ok(Json(outcome))
}
