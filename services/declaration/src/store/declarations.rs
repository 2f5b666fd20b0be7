//! Declaration persistence: the header row, its items, flags and
//! validation reports. Writes that must be atomic (regeneration,
//! status changes) run inside a caller-held transaction with the
//! declaration row locked.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

use chrono::Utc;
use common::{ServiceError, ServiceResult};

use crate::models::{
    Declaration, DeclarationHeader, DeclarationItem, DeclarationKind, DeclarationStatus,
    ItemSource, ReportKind, Taxpayer, ValidationReport, FORM_270,
};

use super::is_unique_violation;

const DECLARATION_COLUMNS: &str =
    "id, taxpayer_id, tax_year, form_code, kind, status, iin, last_name, first_name,
     middle_name, phone, email, spouse_iin, legal_rep_iin, flags, validated_at,
     exported_at, created_at, updated_at";

/// Finds the unique declaration for (taxpayer, year, form) or creates it
/// in DRAFT with the header snapshot taken from the taxpayer. A
/// concurrent creator losing the race reads the winner's row.
pub async fn find_or_create(
    pool: &PgPool,
    taxpayer: &Taxpayer,
    tax_year: i32,
    kind: DeclarationKind,
) -> ServiceResult<Declaration> {
    if let Some(existing) = by_taxpayer_year(pool, taxpayer.id, tax_year).await? {
        return Ok(existing);
    }

    let header = DeclarationHeader::from_taxpayer(taxpayer);
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO declarations (id, taxpayer_id, tax_year, form_code, kind, status,
         iin, last_name, first_name, middle_name, phone, email, spouse_iin,
         legal_rep_iin, flags, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(Uuid::new_v4())
    .bind(taxpayer.id)
    .bind(tax_year)
    .bind(FORM_270)
    .bind(kind.to_string())
    .bind(DeclarationStatus::Draft.to_string())
    .bind(&header.iin)
    .bind(&header.last_name)
    .bind(&header.first_name)
    .bind(&header.middle_name)
    .bind(&header.phone)
    .bind(&header.email)
    .bind(&header.spouse_iin)
    .bind(&header.legal_rep_iin)
    .bind(serde_json::json!({}))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {}
        Err(e) => return Err(e.into()),
    }

    by_taxpayer_year(pool, taxpayer.id, tax_year)
        .await?
        .ok_or_else(|| ServiceError::Internal("declaration row disappeared".to_string()))
}

pub async fn by_taxpayer_year(
    pool: &PgPool,
    taxpayer_id: Uuid,
    tax_year: i32,
) -> ServiceResult<Option<Declaration>> {
    let row = sqlx::query_as::<_, DeclarationRow>(&format!(
        "SELECT {} FROM declarations
         WHERE taxpayer_id = $1 AND tax_year = $2 AND form_code = $3",
        DECLARATION_COLUMNS
    ))
    .bind(taxpayer_id)
    .bind(tax_year)
    .bind(FORM_270)
    .fetch_optional(pool)
    .await?;
    row.map(DeclarationRow::into_model).transpose()
}

pub async fn get(pool: &PgPool, id: Uuid) -> ServiceResult<Option<Declaration>> {
    let row = sqlx::query_as::<_, DeclarationRow>(&format!(
        "SELECT {} FROM declarations WHERE id = $1",
        DECLARATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(DeclarationRow::into_model).transpose()
}

pub async fn require(pool: &PgPool, id: Uuid) -> ServiceResult<Declaration> {
    get(pool, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("declaration {}", id)))
}

/// Row lock for per-declaration serialization of generate / transition /
/// project.
pub async fn lock(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> ServiceResult<Declaration> {
    let row = sqlx::query_as::<_, DeclarationRow>(&format!(
        "SELECT {} FROM declarations WHERE id = $1 FOR UPDATE",
        DECLARATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| ServiceError::NotFound(format!("declaration {}", id)))?;
    row.into_model()
}

pub async fn update_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: DeclarationStatus,
) -> ServiceResult<()> {
    let validated_at = matches!(status, DeclarationStatus::Validated).then(Utc::now);
    sqlx::query(
        "UPDATE declarations
         SET status = $1,
             validated_at = COALESCE($2, validated_at),
             updated_at = $3
         WHERE id = $4",
    )
    .bind(status.to_string())
    .bind(validated_at)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Refreshes the snapshot header from the taxpayer on regeneration.
pub async fn refresh_header(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    header: &DeclarationHeader,
) -> ServiceResult<()> {
    sqlx::query(
        "UPDATE declarations
         SET iin = $1, last_name = $2, first_name = $3, middle_name = $4,
             phone = $5, email = $6, spouse_iin = $7, legal_rep_iin = $8,
             updated_at = $9
         WHERE id = $10",
    )
    .bind(&header.iin)
    .bind(&header.last_name)
    .bind(&header.first_name)
    .bind(&header.middle_name)
    .bind(&header.phone)
    .bind(&header.email)
    .bind(&header.spouse_iin)
    .bind(&header.legal_rep_iin)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Regeneration starts from a clean slate: manual overrides go too.
pub async fn delete_items(
    tx: &mut Transaction<'_, Postgres>,
    declaration_id: Uuid,
) -> ServiceResult<u64> {
    let result = sqlx::query("DELETE FROM declaration_items WHERE declaration_id = $1")
        .bind(declaration_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

pub async fn bulk_upsert_items(
    tx: &mut Transaction<'_, Postgres>,
    declaration_id: Uuid,
    field_values: &BTreeMap<String, Decimal>,
    source: ItemSource,
) -> ServiceResult<()> {
    for (logical_field, value) in field_values {
        sqlx::query(
            "INSERT INTO declaration_items (id, declaration_id, logical_field, value, source)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (declaration_id, logical_field)
             DO UPDATE SET value = EXCLUDED.value, source = EXCLUDED.source",
        )
        .bind(Uuid::new_v4())
        .bind(declaration_id)
        .bind(logical_field)
        // storage scale is 2, half-up
        .bind(utils::AmountRounding::to_money(*value))
        .bind(source.to_string())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Shallow JSON merge of new flags over the stored map.
pub async fn merge_flags(
    tx: &mut Transaction<'_, Postgres>,
    declaration_id: Uuid,
    flags: &BTreeMap<String, bool>,
) -> ServiceResult<()> {
    let patch = serde_json::to_value(flags)
        .map_err(|e| ServiceError::Internal(format!("flags encode: {}", e)))?;
    sqlx::query(
        "UPDATE declarations SET flags = flags || $1::jsonb, updated_at = $2 WHERE id = $3",
    )
    .bind(patch)
    .bind(Utc::now())
    .bind(declaration_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn mark_exported(
    tx: &mut Transaction<'_, Postgres>,
    declaration_id: Uuid,
) -> ServiceResult<()> {
    sqlx::query("UPDATE declarations SET exported_at = $1, updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(declaration_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn items_for(pool: &PgPool, declaration_id: Uuid) -> ServiceResult<Vec<DeclarationItem>> {
    let rows = sqlx::query_as::<_, DeclarationItemRow>(
        "SELECT id, declaration_id, logical_field, value, source
         FROM declaration_items
         WHERE declaration_id = $1
         ORDER BY logical_field",
    )
    .bind(declaration_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(DeclarationItemRow::into_model).collect()
}

pub async fn item_values(
    pool: &PgPool,
    declaration_id: Uuid,
) -> ServiceResult<BTreeMap<String, Decimal>> {
    Ok(items_for(pool, declaration_id)
        .await?
        .into_iter()
        .map(|item| (item.logical_field, item.value))
        .collect())
}

pub async fn insert_report(
    pool: &PgPool,
    declaration_id: Uuid,
    kind: ReportKind,
    is_valid: bool,
    report: serde_json::Value,
) -> ServiceResult<ValidationReport> {
    let record = ValidationReport {
        id: Uuid::new_v4(),
        declaration_id,
        kind,
        is_valid,
        report,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO validation_reports (id, declaration_id, kind, is_valid, report, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(record.id)
    .bind(record.declaration_id)
    .bind(record.kind.to_string())
    .bind(record.is_valid)
    .bind(&record.report)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(record)
}

pub async fn reports_for(
    pool: &PgPool,
    declaration_id: Uuid,
) -> ServiceResult<Vec<ValidationReport>> {
    let rows = sqlx::query_as::<_, ValidationReportRow>(
        "SELECT id, declaration_id, kind, is_valid, report, created_at
         FROM validation_reports
         WHERE declaration_id = $1
         ORDER BY created_at DESC",
    )
    .bind(declaration_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(ValidationReportRow::into_model).collect()
}

#[derive(sqlx::FromRow)]
struct DeclarationRow {
    id: Uuid,
    taxpayer_id: Uuid,
    tax_year: i32,
    form_code: String,
    kind: String,
    status: String,
    iin: String,
    last_name: String,
    first_name: String,
    middle_name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    spouse_iin: Option<String>,
    legal_rep_iin: Option<String>,
    flags: serde_json::Value,
    validated_at: Option<chrono::DateTime<chrono::Utc>>,
    exported_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl DeclarationRow {
    fn into_model(self) -> ServiceResult<Declaration> {
        let kind: DeclarationKind = self
            .kind
            .parse()
            .map_err(|e: String| ServiceError::Internal(e))?;
        let status: DeclarationStatus = self
            .status
            .parse()
            .map_err(|e: String| ServiceError::Internal(e))?;
        let flags: BTreeMap<String, bool> = serde_json::from_value(self.flags)
            .map_err(|e| ServiceError::Internal(format!("flags decode: {}", e)))?;
        Ok(Declaration {
            id: self.id,
            taxpayer_id: self.taxpayer_id,
            tax_year: self.tax_year,
            form_code: self.form_code,
            kind,
            status,
            header: DeclarationHeader {
                iin: self.iin,
                last_name: self.last_name,
                first_name: self.first_name,
                middle_name: self.middle_name,
                phone: self.phone,
                email: self.email,
                spouse_iin: self.spouse_iin,
                legal_rep_iin: self.legal_rep_iin,
            },
            flags,
            validated_at: self.validated_at,
            exported_at: self.exported_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeclarationItemRow {
    id: Uuid,
    declaration_id: Uuid,
    logical_field: String,
    value: Decimal,
    source: String,
}

impl DeclarationItemRow {
    fn into_model(self) -> ServiceResult<DeclarationItem> {
        let source: ItemSource = self
            .source
            .parse()
            .map_err(|e: String| ServiceError::Internal(e))?;
        Ok(DeclarationItem {
            id: self.id,
            declaration_id: self.declaration_id,
            logical_field: self.logical_field,
            value: self.value,
            source,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ValidationReportRow {
    id: Uuid,
    declaration_id: Uuid,
    kind: String,
    is_valid: bool,
    report: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl ValidationReportRow {
    fn into_model(self) -> ServiceResult<ValidationReport> {
        let kind: ReportKind = self
            .kind
            .parse()
            .map_err(|e: String| ServiceError::Internal(e))?;
        Ok(ValidationReport {
            id: self.id,
            declaration_id: self.declaration_id,
            kind,
            is_valid: self.is_valid,
            report: self.report,
            created_at: self.created_at,
        })
    }
}
