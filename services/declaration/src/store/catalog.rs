//! Rule catalog persistence: the reference tables (event types, logical
//! fields, rules, XML field maps) and the seed loader. No business
//! logic lives here beyond referential validation on rule insert.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use common::{ServiceError, ServiceResult};

use crate::catalog::actions::{self, RuleAction};
use crate::catalog::seed;
use crate::engine::Vocabulary;
use crate::models::{EventTypeCode, LogicalField, RuleKind, TaxRule, XmlFieldMap};

pub async fn list_event_types(pool: &PgPool) -> ServiceResult<Vec<EventTypeCode>> {
    let rows = sqlx::query_as::<_, CodeRow>(
        "SELECT code, description FROM tax_event_types ORDER BY code",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| EventTypeCode { code: row.code, description: row.description })
        .collect())
}

pub async fn insert_event_type(pool: &PgPool, event_type: &EventTypeCode) -> ServiceResult<()> {
    if !event_type.code.starts_with("EV_") {
        return Err(ServiceError::Unprocessable(format!(
            "event type code {} must match EV_*",
            event_type.code
        )));
    }
    sqlx::query("INSERT INTO tax_event_types (code, description) VALUES ($1, $2)")
        .bind(&event_type.code)
        .bind(&event_type.description)
        .execute(pool)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                ServiceError::Conflict(format!("event type {} already exists", event_type.code))
            } else {
                e.into()
            }
        })?;
    Ok(())
}

pub async fn list_logical_fields(pool: &PgPool) -> ServiceResult<Vec<LogicalField>> {
    let rows = sqlx::query_as::<_, CodeRow>(
        "SELECT code, description FROM logical_fields ORDER BY code",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| LogicalField { code: row.code, description: row.description })
        .collect())
}

pub async fn insert_logical_field(pool: &PgPool, field: &LogicalField) -> ServiceResult<()> {
    if !field.code.starts_with("LF_") {
        return Err(ServiceError::Unprocessable(format!(
            "logical field code {} must match LF_*",
            field.code
        )));
    }
    sqlx::query("INSERT INTO logical_fields (code, description) VALUES ($1, $2)")
        .bind(&field.code)
        .bind(&field.description)
        .execute(pool)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                ServiceError::Conflict(format!("logical field {} already exists", field.code))
            } else {
                e.into()
            }
        })?;
    Ok(())
}

/// The engine's reference vocabulary, read once per run.
pub async fn vocabulary(pool: &PgPool) -> ServiceResult<Vocabulary> {
    let event_types: Vec<String> = sqlx::query_scalar("SELECT code FROM tax_event_types")
        .fetch_all(pool)
        .await?;
    let logical_fields: Vec<String> = sqlx::query_scalar("SELECT code FROM logical_fields")
        .fetch_all(pool)
        .await?;
    Ok(Vocabulary {
        event_types: event_types.into_iter().collect(),
        logical_fields: logical_fields.into_iter().collect(),
    })
}

/// Inserts a rule after checking that its actions decode and that every
/// map/calc target exists in the logical-field table.
pub async fn insert_rule(pool: &PgPool, rule: &TaxRule) -> ServiceResult<()> {
    let decoded = actions::decode_actions(rule.kind, &rule.actions)
        .map_err(|reason| ServiceError::Unprocessable(format!("rule actions: {}", reason)))?;

    for action in &decoded {
        let target = match action {
            RuleAction::Map(map) => Some(map.target.as_str()),
            RuleAction::Calc(calc) => Some(calc.target.as_str()),
            _ => None,
        };
        if let Some(target) = target {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM logical_fields WHERE code = $1)")
                    .bind(target)
                    .fetch_one(pool)
                    .await?;
            if !exists {
                return Err(ServiceError::Conflict(format!(
                    "rule {} references missing logical field {}",
                    rule.rule_code, target
                )));
            }
        }

        // a calc rule must not read the field it writes
        if let RuleAction::Calc(calc) = action {
            if calc.formula.references().contains(&calc.target.as_str()) {
                return Err(ServiceError::Unprocessable(format!(
                    "rule {} formula references its own target {}",
                    rule.rule_code, calc.target
                )));
            }
        }
    }

    sqlx::query(
        "INSERT INTO tax_rules (id, rule_code, tax_year, rule_type, conditions, actions,
         priority, active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(rule.id)
    .bind(&rule.rule_code)
    .bind(rule.tax_year)
    .bind(rule.kind.to_string())
    .bind(&rule.conditions)
    .bind(&rule.actions)
    .bind(rule.priority)
    .bind(rule.active)
    .bind(rule.created_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if super::is_unique_violation(&e) {
            ServiceError::Conflict(format!("rule {} already exists", rule.rule_code))
        } else {
            e.into()
        }
    })?;
    Ok(())
}

/// Active rules applicable to a tax year, in execution order.
pub async fn active_rules_for_year(pool: &PgPool, tax_year: i32) -> ServiceResult<Vec<TaxRule>> {
    let rows = sqlx::query_as::<_, TaxRuleRow>(
        "SELECT id, rule_code, tax_year, rule_type, conditions, actions, priority,
         active, created_at
         FROM tax_rules
         WHERE active = true AND (tax_year IS NULL OR tax_year = $1)
         ORDER BY priority, created_at",
    )
    .bind(tax_year)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TaxRuleRow::into_model).collect()
}

pub async fn list_rules(pool: &PgPool) -> ServiceResult<Vec<TaxRule>> {
    let rows = sqlx::query_as::<_, TaxRuleRow>(
        "SELECT id, rule_code, tax_year, rule_type, conditions, actions, priority,
         active, created_at
         FROM tax_rules
         ORDER BY priority, created_at",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(TaxRuleRow::into_model).collect()
}

pub async fn set_rule_active(pool: &PgPool, id: Uuid, active: bool) -> ServiceResult<bool> {
    let result = sqlx::query("UPDATE tax_rules SET active = $1 WHERE id = $2")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn xml_field_maps(pool: &PgPool) -> ServiceResult<Vec<XmlFieldMap>> {
    let rows = sqlx::query_as::<_, XmlFieldMapRow>(
        "SELECT form_code, application_code, logical_field, xml_field_name, position
         FROM xml_field_map
         ORDER BY form_code, application_code, position",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(XmlFieldMapRow::into_model).collect())
}

/// Loads the seed vocabulary, standard rules and XML layout. Safe to run
/// on every start: existing rows are left alone.
pub async fn apply_seed(pool: &PgPool) -> ServiceResult<()> {
    for event_type in seed::event_types() {
        sqlx::query(
            "INSERT INTO tax_event_types (code, description) VALUES ($1, $2)
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(&event_type.code)
        .bind(&event_type.description)
        .execute(pool)
        .await?;
    }

    for field in seed::logical_fields() {
        sqlx::query(
            "INSERT INTO logical_fields (code, description) VALUES ($1, $2)
             ON CONFLICT (code) DO NOTHING",
        )
        .bind(&field.code)
        .bind(&field.description)
        .execute(pool)
        .await?;
    }

    for rule in seed::rules() {
        sqlx::query(
            "INSERT INTO tax_rules (id, rule_code, tax_year, rule_type, conditions,
             actions, priority, active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (rule_code) DO NOTHING",
        )
        .bind(rule.id)
        .bind(&rule.rule_code)
        .bind(rule.tax_year)
        .bind(rule.kind.to_string())
        .bind(&rule.conditions)
        .bind(&rule.actions)
        .bind(rule.priority)
        .bind(rule.active)
        .bind(rule.created_at)
        .execute(pool)
        .await?;
    }

    for map in seed::xml_field_maps() {
        sqlx::query(
            "INSERT INTO xml_field_map (form_code, application_code, logical_field,
             xml_field_name, position)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (form_code, application_code, xml_field_name) DO NOTHING",
        )
        .bind(&map.form_code)
        .bind(&map.application_code)
        .bind(&map.logical_field)
        .bind(&map.xml_field_name)
        .bind(map.position)
        .execute(pool)
        .await?;
    }

    tracing::info!("catalog seed applied");
    Ok(())
}

#[derive(sqlx::FromRow)]
struct CodeRow {
    code: String,
    description: String,
}

#[derive(sqlx::FromRow)]
struct TaxRuleRow {
    id: Uuid,
    rule_code: String,
    tax_year: Option<i32>,
    rule_type: String,
    conditions: serde_json::Value,
    actions: serde_json::Value,
    priority: i32,
    active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TaxRuleRow {
    fn into_model(self) -> ServiceResult<TaxRule> {
        let kind: RuleKind = self
            .rule_type
            .parse()
            .map_err(|e: String| ServiceError::Internal(e))?;
        Ok(TaxRule {
            id: self.id,
            rule_code: self.rule_code,
            tax_year: self.tax_year,
            kind,
            conditions: self.conditions,
            actions: self.actions,
            priority: self.priority,
            active: self.active,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct XmlFieldMapRow {
    form_code: String,
    application_code: String,
    logical_field: Option<String>,
    xml_field_name: String,
    position: i32,
}

impl XmlFieldMapRow {
    fn into_model(self) -> XmlFieldMap {
        XmlFieldMap {
            form_code: self.form_code,
            application_code: self.application_code,
            logical_field: self.logical_field,
            xml_field_name: self.xml_field_name,
            position: self.position,
        }
    }
}

/// Rules freshly authored over the API get their record shape here.
pub fn new_rule(
    rule_code: String,
    tax_year: Option<i32>,
    kind: RuleKind,
    conditions: serde_json::Value,
    actions: serde_json::Value,
    priority: i32,
) -> TaxRule {
    TaxRule {
        id: Uuid::new_v4(),
        rule_code,
        tax_year,
        kind,
        conditions,
        actions,
        priority,
        active: true,
        created_at: Utc::now(),
    }
}
