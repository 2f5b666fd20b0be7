//! Ingestion surface: source record creation (JSON payloads and file
//! uploads), parsing into events, reparse and deactivation.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use base64::Engine;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use common::{ServiceError, ServiceResult};

use crate::models::{SourceKind, SourceRecord, TaxEvent, TaxEventInput};
use crate::parsers::{self, upload};
use crate::store;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub taxpayer_id: Uuid,
    pub source_kind: String,
    pub external_id: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub record: SourceRecord,
    pub created: bool,
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestRequest>,
) -> ServiceResult<Json<IngestResponse>> {
    let source_kind: SourceKind = payload
        .source_kind
        .parse()
        .map_err(|e: String| ServiceError::Unprocessable(e))?;
    ingest_payload(
        &state,
        payload.taxpayer_id,
        source_kind,
        payload.external_id,
        payload.payload,
    )
    .await
    .map(Json)
}

/// CSV text or base64 XLSX bytes, converted to the canonical row-JSON
/// shape before entering the normal ingest path.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub taxpayer_id: Uuid,
    pub source_kind: String,
    pub external_id: Option<String>,
    pub content: Option<String>,
    pub content_base64: Option<String>,
}

pub async fn ingest_upload(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadRequest>,
) -> ServiceResult<Json<IngestResponse>> {
    let source_kind: SourceKind = payload
        .source_kind
        .parse()
        .map_err(|e: String| ServiceError::Unprocessable(e))?;

    let converted = match source_kind {
        SourceKind::Csv => {
            let text = payload
                .content
                .ok_or_else(|| ServiceError::Unprocessable("csv upload needs content".to_string()))?;
            upload::csv_to_rows(&text)?
        }
        SourceKind::Excel => {
            let encoded = payload.content_base64.ok_or_else(|| {
                ServiceError::Unprocessable("excel upload needs content_base64".to_string())
            })?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| ServiceError::Parse(format!("bad base64: {}", e)))?;
            upload::xlsx_to_sheets(&bytes)?
        }
        other => {
            return Err(ServiceError::Unprocessable(format!(
                "uploads are csv or excel, not {}",
                other
            )))
        }
    };

    ingest_payload(
        &state,
        payload.taxpayer_id,
        source_kind,
        payload.external_id,
        converted,
    )
    .await
    .map(Json)
}

async fn ingest_payload(
    state: &AppState,
    taxpayer_id: Uuid,
    source_kind: SourceKind,
    external_id: Option<String>,
    payload: serde_json::Value,
) -> ServiceResult<IngestResponse> {
    let taxpayer = store::taxpayers::require(&state.db, taxpayer_id).await?;

    let checksum = utils::payload_checksum(&payload);
    let record = SourceRecord {
        id: Uuid::new_v4(),
        taxpayer_id: taxpayer.id,
        source_kind,
        external_id,
        checksum,
        raw_payload: payload,
        imported_at: Utc::now(),
        active: true,
    };

    let (record, created) = store::source_records::insert_or_existing(&state.db, &record).await?;
    if created {
        tracing::info!("ingested source record {} ({})", record.id, record.source_kind);
    } else {
        tracing::info!("source record {} already ingested, returning existing", record.id);
    }
    Ok(IngestResponse { record, created })
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub created: usize,
    pub skipped: bool,
    pub events: Vec<TaxEvent>,
}

/// Idempotent: a source record that already has events short-circuits.
pub async fn parse_source_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServiceResult<Json<ParseResponse>> {
    let record = store::source_records::require(&state.db, id).await?;
    ensure_active(&record)?;

    let existing = store::events::by_source(&state.db, record.id).await?;
    if !existing.is_empty() {
        return Ok(Json(ParseResponse { created: 0, skipped: true, events: existing }));
    }

    let events = parse_record_events(&state, &record).await?;

    let mut tx = state.db.begin().await?;
    store::events::insert_many(&mut tx, &events).await?;
    tx.commit().await?;

    tracing::info!("parsed {} events from source record {}", events.len(), record.id);
    Ok(Json(ParseResponse { created: events.len(), skipped: false, events }))
}

/// Drops the record's events and parses afresh.
pub async fn reparse_source_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServiceResult<Json<ParseResponse>> {
    let record = store::source_records::require(&state.db, id).await?;
    ensure_active(&record)?;

    let events = parse_record_events(&state, &record).await?;

    let mut tx = state.db.begin().await?;
    let dropped = store::events::delete_by_source(&mut tx, record.id).await?;
    store::events::insert_many(&mut tx, &events).await?;
    tx.commit().await?;

    tracing::info!(
        "reparsed source record {}: {} events replaced by {}",
        record.id,
        dropped,
        events.len()
    );
    Ok(Json(ParseResponse { created: events.len(), skipped: false, events }))
}

pub async fn deactivate_source_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServiceResult<Json<serde_json::Value>> {
    let record = store::source_records::require(&state.db, id).await?;
    store::source_records::deactivate(&state.db, record.id).await?;
    let deactivated_events = store::events::deactivate_by_source(&state.db, record.id).await?;

    tracing::info!(
        "deactivated source record {} and {} events",
        record.id,
        deactivated_events
    );
    Ok(Json(serde_json::json!({
        "source_record_id": record.id,
        "deactivated_events": deactivated_events,
    })))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub taxpayer_id: Uuid,
    pub tax_year: i32,
}

pub async fn list_tax_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> ServiceResult<Json<Vec<TaxEvent>>> {
    store::taxpayers::require(&state.db, query.taxpayer_id).await?;
    let events =
        store::events::by_taxpayer_year(&state.db, query.taxpayer_id, query.tax_year).await?;
    Ok(Json(events))
}

fn ensure_active(record: &SourceRecord) -> ServiceResult<()> {
    if !record.active {
        return Err(ServiceError::Unprocessable(format!(
            "source record {} is deactivated",
            record.id
        )));
    }
    Ok(())
}

/// Runs the parser and rejects any event type outside the catalog before
/// anything touches the store.
async fn parse_record_events(
    state: &AppState,
    record: &SourceRecord,
) -> ServiceResult<Vec<TaxEvent>> {
    let inputs = parsers::parser_for(record.source_kind).parse(record)?;

    let vocabulary = store::catalog::vocabulary(&state.db).await?;
    for input in &inputs {
        if !vocabulary.event_types.contains(&input.event_type) {
            return Err(ServiceError::Conflict(format!(
                "unknown event type {} from source record {}",
                input.event_type, record.id
            )));
        }
    }

    Ok(inputs
        .into_iter()
        .map(|input| materialize(record, input))
        .collect())
}

fn materialize(record: &SourceRecord, input: TaxEventInput) -> TaxEvent {
    TaxEvent {
        id: Uuid::new_v4(),
        taxpayer_id: record.taxpayer_id,
        source_record_id: Some(record.id),
        event_type: input.event_type,
        tax_year: input.event_date.year(),
        event_date: input.event_date,
        amount: input.amount,
        currency: input.currency,
        metadata: input.metadata,
        active: true,
        created_at: Utc::now(),
    }
}
