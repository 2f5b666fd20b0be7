//! Taxpayer persistence.

use sqlx::PgPool;
use uuid::Uuid;

use common::{ServiceError, ServiceResult};

use crate::models::Taxpayer;

use super::is_unique_violation;

pub async fn insert(pool: &PgPool, taxpayer: &Taxpayer) -> ServiceResult<()> {
    let result = sqlx::query(
        "INSERT INTO taxpayers (id, iin, kind, last_name, first_name, middle_name,
         phone, email, resident, spouse_iin, legal_rep_iin, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(taxpayer.id)
    .bind(&taxpayer.iin)
    .bind(taxpayer.kind.to_string())
    .bind(&taxpayer.last_name)
    .bind(&taxpayer.first_name)
    .bind(&taxpayer.middle_name)
    .bind(&taxpayer.phone)
    .bind(&taxpayer.email)
    .bind(taxpayer.resident)
    .bind(&taxpayer.spouse_iin)
    .bind(&taxpayer.legal_rep_iin)
    .bind(taxpayer.created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict(format!(
            "taxpayer with IIN {} already exists",
            taxpayer.iin
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn get(pool: &PgPool, id: Uuid) -> ServiceResult<Option<Taxpayer>> {
    let row = sqlx::query_as::<_, TaxpayerRow>(
        "SELECT id, iin, kind, last_name, first_name, middle_name, phone, email,
         resident, spouse_iin, legal_rep_iin, created_at
         FROM taxpayers WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(TaxpayerRow::into_model).transpose()
}

pub async fn require(pool: &PgPool, id: Uuid) -> ServiceResult<Taxpayer> {
    get(pool, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("taxpayer {}", id)))
}

#[derive(sqlx::FromRow)]
struct TaxpayerRow {
    id: Uuid,
    iin: String,
    kind: String,
    last_name: String,
    first_name: String,
    middle_name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    resident: bool,
    spouse_iin: Option<String>,
    legal_rep_iin: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TaxpayerRow {
    fn into_model(self) -> ServiceResult<Taxpayer> {
        let kind = self
            .kind
            .parse()
            .map_err(|e: String| ServiceError::Internal(e))?;
        Ok(Taxpayer {
            id: self.id,
            iin: self.iin,
            kind,
            last_name: self.last_name,
            first_name: self.first_name,
            middle_name: self.middle_name,
            phone: self.phone,
            email: self.email,
            resident: self.resident,
            spouse_iin: self.spouse_iin,
            legal_rep_iin: self.legal_rep_iin,
            created_at: self.created_at,
        })
    }
}
