//! Mapping audit rows: one row per fired `map` action, linking a tax
//! event to the logical field and rule that moved its amount.
//! Regeneration replaces the taxpayer-year's rows wholesale.

use chrono::Utc;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use common::ServiceResult;

use crate::engine::MappingRecord;

pub async fn replace_for_taxpayer_year(
    tx: &mut Transaction<'_, Postgres>,
    taxpayer_id: Uuid,
    tax_year: i32,
    mappings: &[MappingRecord],
) -> ServiceResult<()> {
    sqlx::query(
        "DELETE FROM tax_mappings
         WHERE tax_year = $1
           AND tax_event IN (SELECT id FROM tax_events WHERE taxpayer_id = $2 AND tax_year = $1)",
    )
    .bind(tax_year)
    .bind(taxpayer_id)
    .execute(&mut **tx)
    .await?;

    for mapping in mappings {
        sqlx::query(
            "INSERT INTO tax_mappings (id, tax_event, tax_year, logical_field, amount,
             rule_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(mapping.tax_event_id)
        .bind(mapping.tax_year)
        .bind(&mapping.logical_field)
        .bind(mapping.amount)
        .bind(mapping.rule_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
