//! Catalog CRUD: reference vocabularies, rules and the XML field map.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use common::{ServiceError, ServiceResult};

use crate::models::{EventTypeCode, LogicalField, RuleKind, TaxRule, XmlFieldMap};
use crate::store;
use crate::AppState;

pub async fn list_event_types(
    State(state): State<Arc<AppState>>,
) -> ServiceResult<Json<Vec<EventTypeCode>>> {
    Ok(Json(store::catalog::list_event_types(&state.db).await?))
}

pub async fn create_event_type(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EventTypeCode>,
) -> ServiceResult<Json<EventTypeCode>> {
    store::catalog::insert_event_type(&state.db, &payload).await?;
    Ok(Json(payload))
}

pub async fn list_logical_fields(
    State(state): State<Arc<AppState>>,
) -> ServiceResult<Json<Vec<LogicalField>>> {
    Ok(Json(store::catalog::list_logical_fields(&state.db).await?))
}

pub async fn create_logical_field(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LogicalField>,
) -> ServiceResult<Json<LogicalField>> {
    store::catalog::insert_logical_field(&state.db, &payload).await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub rule_code: String,
    pub tax_year: Option<i32>,
    pub kind: String,
    pub conditions: serde_json::Value,
    pub actions: serde_json::Value,
    pub priority: i32,
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRuleRequest>,
) -> ServiceResult<Json<TaxRule>> {
    let kind: RuleKind = payload
        .kind
        .parse()
        .map_err(|e: String| ServiceError::Unprocessable(e))?;

    let rule = store::catalog::new_rule(
        payload.rule_code,
        payload.tax_year,
        kind,
        payload.conditions,
        payload.actions,
        payload.priority,
    );
    store::catalog::insert_rule(&state.db, &rule).await?;
    tracing::info!("created rule {} ({})", rule.rule_code, rule.kind);
    Ok(Json(rule))
}

pub async fn list_rules(State(state): State<Arc<AppState>>) -> ServiceResult<Json<Vec<TaxRule>>> {
    Ok(Json(store::catalog::list_rules(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct RuleActiveRequest {
    pub active: bool,
}

pub async fn set_rule_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RuleActiveRequest>,
) -> ServiceResult<Json<serde_json::Value>> {
    let updated = store::catalog::set_rule_active(&state.db, id, payload.active).await?;
    if !updated {
        return Err(ServiceError::NotFound(format!("rule {}", id)));
    }
    Ok(Json(serde_json::json!({ "id": id, "active": payload.active })))
}

pub async fn list_xml_field_maps(
    State(state): State<Arc<AppState>>,
) -> ServiceResult<Json<Vec<XmlFieldMap>>> {
    Ok(Json(store::catalog::xml_field_maps(&state.db).await?))
}
