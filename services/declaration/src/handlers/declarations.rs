//! Declaration lifecycle surface: generation, validation, status
//! transitions and XML projection. Every mutating path locks the
//! declaration row, so concurrent calls on one declaration serialize.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use common::{ServiceError, ServiceResult};

use crate::engine::RunOutcome;
use crate::models::{
    Declaration, DeclarationHeader, DeclarationItem, DeclarationKind, DeclarationStatus,
    ItemSource, ReportKind, ValidationReport, XmlExport,
};
use crate::store;
use crate::workflow;
use crate::xml;
use crate::AppState;

use super::engine::run_for_taxpayer;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub taxpayer_id: Uuid,
    pub tax_year: i32,
    pub kind: Option<String>,
    #[serde(default)]
    pub allow_empty: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub declaration: Declaration,
    pub run: RunOutcome,
}

/// Runs the engine and replaces the declaration's items and flags in one
/// transaction. Regeneration of a validated declaration drops it back to
/// draft first.
pub async fn generate_declaration(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> ServiceResult<Json<GenerateResponse>> {
    let taxpayer = store::taxpayers::require(&state.db, payload.taxpayer_id).await?;
    let kind: DeclarationKind = match payload.kind.as_deref() {
        None => DeclarationKind::Main,
        Some(raw) => raw
            .parse()
            .map_err(|e: String| ServiceError::Unprocessable(e))?,
    };

    let declaration =
        store::declarations::find_or_create(&state.db, &taxpayer, payload.tax_year, kind).await?;

    // Inputs are snapshots taken before the write transaction opens.
    let outcome = run_for_taxpayer(
        &state.db,
        taxpayer.id,
        payload.tax_year,
        payload.allow_empty,
    )
    .await?;

    let mut tx = state.db.begin().await?;
    let locked = store::declarations::lock(&mut tx, declaration.id).await?;

    if !workflow::can_regenerate(locked.status) {
        return Err(ServiceError::Conflict(format!(
            "declaration in {} cannot be regenerated",
            locked.status
        )));
    }
    if locked.status == DeclarationStatus::Validated {
        store::declarations::update_status(&mut tx, locked.id, DeclarationStatus::Draft).await?;
    }

    store::declarations::refresh_header(
        &mut tx,
        locked.id,
        &DeclarationHeader::from_taxpayer(&taxpayer),
    )
    .await?;
    store::declarations::delete_items(&mut tx, locked.id).await?;
    store::declarations::bulk_upsert_items(
        &mut tx,
        locked.id,
        &outcome.field_values,
        ItemSource::RuleEngine,
    )
    .await?;
    store::declarations::merge_flags(&mut tx, locked.id, &outcome.flags).await?;
    store::mappings::replace_for_taxpayer_year(
        &mut tx,
        taxpayer.id,
        payload.tax_year,
        &outcome.mappings,
    )
    .await?;
    tx.commit().await?;

    let declaration = store::declarations::require(&state.db, declaration.id).await?;
    tracing::info!(
        "generated declaration {} for taxpayer {} year {}",
        declaration.id,
        taxpayer.id,
        payload.tax_year
    );
    Ok(Json(GenerateResponse { declaration, run: outcome }))
}

#[derive(Debug, Serialize)]
pub struct DeclarationResponse {
    pub declaration: Declaration,
    pub items: Vec<DeclarationItem>,
    pub reports: Vec<ValidationReport>,
}

pub async fn get_declaration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServiceResult<Json<DeclarationResponse>> {
    let declaration = store::declarations::require(&state.db, id).await?;
    let items = store::declarations::items_for(&state.db, id).await?;
    let reports = store::declarations::reports_for(&state.db, id).await?;
    Ok(Json(DeclarationResponse { declaration, items, reports }))
}

/// The DRAFT → VALIDATED gate. A failed gate persists an invalid report,
/// leaves the declaration in draft and reports 422.
pub async fn validate_declaration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServiceResult<Json<DeclarationResponse>> {
    let mut tx = state.db.begin().await?;
    let declaration = store::declarations::lock(&mut tx, id).await?;

    workflow::ensure_transition(declaration.status, DeclarationStatus::Validated)?;

    let items = store::declarations::item_values(&state.db, id).await?;
    let gate = workflow::business_validation(&items);

    if !gate.is_valid {
        tx.rollback().await?;
        store::declarations::insert_report(&state.db, id, ReportKind::Business, false, gate.report)
            .await?;
        return Err(ServiceError::Unprocessable(format!(
            "declaration {} failed business validation",
            id
        )));
    }

    store::declarations::update_status(&mut tx, id, DeclarationStatus::Validated).await?;
    tx.commit().await?;
    store::declarations::insert_report(&state.db, id, ReportKind::Business, true, gate.report)
        .await?;

    tracing::info!("declaration {} validated", id);
    declaration_response(&state, id).await.map(Json)
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
}

pub async fn transition_declaration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> ServiceResult<Json<DeclarationResponse>> {
    let target: DeclarationStatus = payload
        .status
        .parse()
        .map_err(|e: String| ServiceError::Unprocessable(e))?;

    // the gated transition delegates to the validation path
    if target == DeclarationStatus::Validated {
        let current = store::declarations::require(&state.db, id).await?;
        if current.status == DeclarationStatus::Draft {
            return validate_declaration(State(state), Path(id)).await;
        }
    }

    let mut tx = state.db.begin().await?;
    let declaration = store::declarations::lock(&mut tx, id).await?;
    workflow::ensure_transition(declaration.status, target)?;
    store::declarations::update_status(&mut tx, id, target).await?;
    tx.commit().await?;

    tracing::info!("declaration {} moved {} -> {}", id, declaration.status, target);
    declaration_response(&state, id).await.map(Json)
}

/// Projects the declaration into the regulator XML, appends a new
/// monotonic export version and returns it.
pub async fn project_declaration_xml(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServiceResult<Json<XmlExport>> {
    let mut tx = state.db.begin().await?;
    let declaration = store::declarations::lock(&mut tx, id).await?;

    if matches!(
        declaration.status,
        DeclarationStatus::Draft | DeclarationStatus::Rejected
    ) {
        return Err(ServiceError::Unprocessable(format!(
            "declaration {} must be validated before export",
            id
        )));
    }

    let items = store::declarations::item_values(&state.db, id).await?;
    let layout = store::catalog::xml_field_maps(&state.db).await?;

    let payload = xml::project(&declaration, &items, &layout);
    if !xml::structural_check(&payload) {
        return Err(ServiceError::Internal(format!(
            "projected XML for declaration {} failed the structural check",
            id
        )));
    }
    let content_hash = xml::content_hash(&payload);

    let export = store::exports::insert(&mut tx, id, payload, content_hash).await?;
    store::declarations::mark_exported(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!(
        "declaration {} exported as version {} ({})",
        id,
        export.schema_version,
        export.content_hash
    );
    Ok(Json(export))
}

pub async fn latest_declaration_xml(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServiceResult<Json<XmlExport>> {
    store::declarations::require(&state.db, id).await?;
    store::exports::latest(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("no XML export for declaration {}", id)))
}

async fn declaration_response(
    state: &AppState,
    id: Uuid,
) -> ServiceResult<DeclarationResponse> {
    let declaration = store::declarations::require(&state.db, id).await?;
    let items = store::declarations::items_for(&state.db, id).await?;
    let reports = store::declarations::reports_for(&state.db, id).await?;
    Ok(DeclarationResponse { declaration, items, reports })
}
