//! XML export persistence. Exports are append-only; versions are
//! monotonic per declaration starting at 1. The caller holds the
//! declaration row lock, which serializes version assignment.

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use common::{ServiceError, ServiceResult};

use crate::models::XmlExport;

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    declaration_id: Uuid,
    payload: String,
    content_hash: String,
) -> ServiceResult<XmlExport> {
    let prior: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM xml_exports WHERE declaration_id = $1")
            .bind(declaration_id)
            .fetch_one(&mut **tx)
            .await?;
    let schema_version = i32::try_from(prior + 1)
        .map_err(|_| ServiceError::Internal("export version overflow".to_string()))?;

    let export = XmlExport {
        id: Uuid::new_v4(),
        declaration_id,
        payload,
        schema_version,
        content_hash,
        signed: false,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO xml_exports (id, declaration_id, payload, schema_version,
         content_hash, signed, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(export.id)
    .bind(export.declaration_id)
    .bind(&export.payload)
    .bind(export.schema_version)
    .bind(&export.content_hash)
    .bind(export.signed)
    .bind(export.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(export)
}

pub async fn latest(pool: &PgPool, declaration_id: Uuid) -> ServiceResult<Option<XmlExport>> {
    let row = sqlx::query_as::<_, XmlExportRow>(
        "SELECT id, declaration_id, payload, schema_version, content_hash, signed, created_at
         FROM xml_exports
         WHERE declaration_id = $1
         ORDER BY schema_version DESC
         LIMIT 1",
    )
    .bind(declaration_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(XmlExportRow::into_model))
}

#[derive(sqlx::FromRow)]
struct XmlExportRow {
    id: Uuid,
    declaration_id: Uuid,
    payload: String,
    schema_version: i32,
    content_hash: String,
    signed: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl XmlExportRow {
    fn into_model(self) -> XmlExport {
        XmlExport {
            id: self.id,
            declaration_id: self.declaration_id,
            payload: self.payload,
            schema_version: self.schema_version,
            content_hash: self.content_hash,
            signed: self.signed,
            created_at: self.created_at,
        }
    }
}
