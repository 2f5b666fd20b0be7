//! Tax event persistence. The table is append-only: reparse deletes and
//! re-inserts for one source record, deactivation is a soft flag.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use common::ServiceResult;

use crate::models::TaxEvent;

pub async fn insert_many(
    tx: &mut Transaction<'_, Postgres>,
    events: &[TaxEvent],
) -> ServiceResult<()> {
    for event in events {
        sqlx::query(
            "INSERT INTO tax_events (id, taxpayer_id, source_record_id, event_type,
             event_date, amount, currency, metadata, tax_year, active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(event.id)
        .bind(event.taxpayer_id)
        .bind(event.source_record_id)
        .bind(&event.event_type)
        .bind(event.event_date)
        .bind(event.amount)
        .bind(&event.currency)
        .bind(&event.metadata)
        .bind(event.tax_year)
        .bind(event.active)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// The engine's event snapshot: active events of one taxpayer-year in
/// (event_date, id) order.
pub async fn by_taxpayer_year(
    pool: &PgPool,
    taxpayer_id: Uuid,
    tax_year: i32,
) -> ServiceResult<Vec<TaxEvent>> {
    let rows = sqlx::query_as::<_, TaxEventRow>(
        "SELECT id, taxpayer_id, source_record_id, event_type, event_date, amount,
         currency, metadata, tax_year, active, created_at
         FROM tax_events
         WHERE taxpayer_id = $1 AND tax_year = $2 AND active = true
         ORDER BY event_date, id",
    )
    .bind(taxpayer_id)
    .bind(tax_year)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(TaxEventRow::into_model).collect())
}

pub async fn by_source(pool: &PgPool, source_record_id: Uuid) -> ServiceResult<Vec<TaxEvent>> {
    let rows = sqlx::query_as::<_, TaxEventRow>(
        "SELECT id, taxpayer_id, source_record_id, event_type, event_date, amount,
         currency, metadata, tax_year, active, created_at
         FROM tax_events
         WHERE source_record_id = $1
         ORDER BY event_date, id",
    )
    .bind(source_record_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(TaxEventRow::into_model).collect())
}

pub async fn count_by_source(pool: &PgPool, source_record_id: Uuid) -> ServiceResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tax_events WHERE source_record_id = $1")
            .bind(source_record_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Used by reparse: the record's events are replaced wholesale.
pub async fn delete_by_source(
    tx: &mut Transaction<'_, Postgres>,
    source_record_id: Uuid,
) -> ServiceResult<u64> {
    let result = sqlx::query("DELETE FROM tax_events WHERE source_record_id = $1")
        .bind(source_record_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Used by source deactivation: events stay on record but stop feeding
/// engine runs.
pub async fn deactivate_by_source(pool: &PgPool, source_record_id: Uuid) -> ServiceResult<u64> {
    let result = sqlx::query("UPDATE tax_events SET active = false WHERE source_record_id = $1")
        .bind(source_record_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[derive(sqlx::FromRow)]
struct TaxEventRow {
    id: Uuid,
    taxpayer_id: Uuid,
    source_record_id: Option<Uuid>,
    event_type: String,
    event_date: chrono::NaiveDate,
    amount: Option<Decimal>,
    currency: Option<String>,
    metadata: serde_json::Value,
    tax_year: i32,
    active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TaxEventRow {
    fn into_model(self) -> TaxEvent {
        TaxEvent {
            id: self.id,
            taxpayer_id: self.taxpayer_id,
            source_record_id: self.source_record_id,
            event_type: self.event_type,
            event_date: self.event_date,
            amount: self.amount,
            currency: self.currency,
            metadata: self.metadata,
            tax_year: self.tax_year,
            active: self.active,
            created_at: self.created_at,
        }
    }
}
