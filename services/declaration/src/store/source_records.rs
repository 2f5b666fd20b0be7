//! Source record persistence. Ingestion is at-most-once per
//! (taxpayer, checksum): a duplicate insert returns the existing row.

use sqlx::PgPool;
use uuid::Uuid;

use common::{ServiceError, ServiceResult};

use crate::models::{SourceKind, SourceRecord};

use super::is_unique_violation;

/// Inserts a record, or returns the already-ingested row with the same
/// checksum. The boolean is true when this call created the row.
pub async fn insert_or_existing(
    pool: &PgPool,
    record: &SourceRecord,
) -> ServiceResult<(SourceRecord, bool)> {
    let result = sqlx::query(
        "INSERT INTO source_records (id, taxpayer_id, source_kind, external_id,
         checksum, raw_payload, imported_at, active)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(record.id)
    .bind(record.taxpayer_id)
    .bind(record.source_kind.to_string())
    .bind(&record.external_id)
    .bind(&record.checksum)
    .bind(&record.raw_payload)
    .bind(record.imported_at)
    .bind(record.active)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok((record.clone(), true)),
        Err(e) if is_unique_violation(&e) => {
            let existing = by_checksum(pool, record.taxpayer_id, &record.checksum)
                .await?
                .ok_or_else(|| {
                    ServiceError::Internal("duplicate checksum row disappeared".to_string())
                })?;
            Ok((existing, false))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get(pool: &PgPool, id: Uuid) -> ServiceResult<Option<SourceRecord>> {
    let row = sqlx::query_as::<_, SourceRecordRow>(
        "SELECT id, taxpayer_id, source_kind, external_id, checksum, raw_payload,
         imported_at, active
         FROM source_records WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(SourceRecordRow::into_model).transpose()
}

pub async fn require(pool: &PgPool, id: Uuid) -> ServiceResult<SourceRecord> {
    get(pool, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("source record {}", id)))
}

pub async fn by_checksum(
    pool: &PgPool,
    taxpayer_id: Uuid,
    checksum: &str,
) -> ServiceResult<Option<SourceRecord>> {
    let row = sqlx::query_as::<_, SourceRecordRow>(
        "SELECT id, taxpayer_id, source_kind, external_id, checksum, raw_payload,
         imported_at, active
         FROM source_records WHERE taxpayer_id = $1 AND checksum = $2",
    )
    .bind(taxpayer_id)
    .bind(checksum)
    .fetch_optional(pool)
    .await?;

    row.map(SourceRecordRow::into_model).transpose()
}

/// Soft-deactivation; the payload itself is immutable.
pub async fn deactivate(pool: &PgPool, id: Uuid) -> ServiceResult<bool> {
    let result = sqlx::query("UPDATE source_records SET active = false WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(sqlx::FromRow)]
struct SourceRecordRow {
    id: Uuid,
    taxpayer_id: Uuid,
    source_kind: String,
    external_id: Option<String>,
    checksum: String,
    raw_payload: serde_json::Value,
    imported_at: chrono::DateTime<chrono::Utc>,
    active: bool,
}

impl SourceRecordRow {
    fn into_model(self) -> ServiceResult<SourceRecord> {
        let source_kind: SourceKind = self
            .source_kind
            .parse()
            .map_err(|e: String| ServiceError::Internal(e))?;
        Ok(SourceRecord {
            id: self.id,
            taxpayer_id: self.taxpayer_id,
            source_kind,
            external_id: self.external_id,
            checksum: self.checksum,
            raw_payload: self.raw_payload,
            imported_at: self.imported_at,
            active: self.active,
        })
    }
}
