use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use common::{ServiceError, ServiceResult};
use utils::KazakhstanValidator;

use crate::models::{Taxpayer, TaxpayerKind};
use crate::store;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaxpayerRequest {
    #[validate(length(equal = 12, message = "IIN must be 12 digits"))]
    pub iin: String,
    pub kind: Option<String>,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    pub middle_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub resident: Option<bool>,
    pub spouse_iin: Option<String>,
    pub legal_rep_iin: Option<String>,
}

pub async fn create_taxpayer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTaxpayerRequest>,
) -> ServiceResult<Json<Taxpayer>> {
    payload
        .validate()
        .map_err(|e| ServiceError::Unprocessable(e.to_string()))?;
    if !KazakhstanValidator::validate_iin(&payload.iin) {
        return Err(ServiceError::Unprocessable(format!(
            "{} is not a valid IIN",
            payload.iin
        )));
    }
    let kind: TaxpayerKind = match payload.kind.as_deref() {
        None => TaxpayerKind::Individual,
        Some(raw) => raw
            .parse()
            .map_err(|e: String| ServiceError::Unprocessable(e))?,
    };

    let taxpayer = Taxpayer {
        id: Uuid::new_v4(),
        iin: payload.iin,
        kind,
        last_name: payload.last_name,
        first_name: payload.first_name,
        middle_name: payload.middle_name,
        phone: payload.phone,
        email: payload.email,
        resident: payload.resident.unwrap_or(true),
        spouse_iin: payload.spouse_iin,
        legal_rep_iin: payload.legal_rep_iin,
        created_at: chrono::Utc::now(),
    };

    store::taxpayers::insert(&state.db, &taxpayer).await?;
    tracing::info!("created taxpayer {}", taxpayer.id);
    Ok(Json(taxpayer))
}

pub async fn get_taxpayer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServiceResult<Json<Taxpayer>> {
    Ok(Json(store::taxpayers::require(&state.db, id).await?))
}
