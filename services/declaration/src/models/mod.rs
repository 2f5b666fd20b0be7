use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxpayerKind {
    Individual,
    Business,
}

impl FromStr for TaxpayerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INDIVIDUAL" => Ok(TaxpayerKind::Individual),
            "BUSINESS" => Ok(TaxpayerKind::Business),
            _ => Err(format!("Invalid taxpayer kind: {}", s)),
        }
    }
}

impl std::fmt::Display for TaxpayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaxpayerKind::Individual => write!(f, "INDIVIDUAL"),
            TaxpayerKind::Business => write!(f, "BUSINESS"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Manual,
    Csv,
    Excel,
    Bank,
    Accounting,
    Api,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MANUAL" => Ok(SourceKind::Manual),
            "CSV" => Ok(SourceKind::Csv),
            "EXCEL" => Ok(SourceKind::Excel),
            "BANK" => Ok(SourceKind::Bank),
            "ACCOUNTING" => Ok(SourceKind::Accounting),
            "API" => Ok(SourceKind::Api),
            _ => Err(format!("Invalid source kind: {}", s)),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Manual => write!(f, "MANUAL"),
            SourceKind::Csv => write!(f, "CSV"),
            SourceKind::Excel => write!(f, "EXCEL"),
            SourceKind::Bank => write!(f, "BANK"),
            SourceKind::Accounting => write!(f, "ACCOUNTING"),
            SourceKind::Api => write!(f, "API"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    Mapping,
    Exclusion,
    Calculation,
    Flag,
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MAPPING" => Ok(RuleKind::Mapping),
            "EXCLUSION" => Ok(RuleKind::Exclusion),
            "CALCULATION" => Ok(RuleKind::Calculation),
            "FLAG" => Ok(RuleKind::Flag),
            _ => Err(format!("Invalid rule kind: {}", s)),
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Mapping => write!(f, "MAPPING"),
            RuleKind::Exclusion => write!(f, "EXCLUSION"),
            RuleKind::Calculation => write!(f, "CALCULATION"),
            RuleKind::Flag => write!(f, "FLAG"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeclarationKind {
    Main,
    Regular,
    Additional,
    Notice,
}

impl FromStr for DeclarationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MAIN" => Ok(DeclarationKind::Main),
            "REGULAR" => Ok(DeclarationKind::Regular),
            "ADDITIONAL" => Ok(DeclarationKind::Additional),
            "NOTICE" => Ok(DeclarationKind::Notice),
            _ => Err(format!("Invalid declaration kind: {}", s)),
        }
    }
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclarationKind::Main => write!(f, "MAIN"),
            DeclarationKind::Regular => write!(f, "REGULAR"),
            DeclarationKind::Additional => write!(f, "ADDITIONAL"),
            DeclarationKind::Notice => write!(f, "NOTICE"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeclarationStatus {
    Draft,
    Validated,
    AwaitingConsent,
    Signed,
    Submitted,
    Accepted,
    Rejected,
}

impl FromStr for DeclarationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(DeclarationStatus::Draft),
            "VALIDATED" => Ok(DeclarationStatus::Validated),
            "AWAITING_CONSENT" => Ok(DeclarationStatus::AwaitingConsent),
            "SIGNED" => Ok(DeclarationStatus::Signed),
            "SUBMITTED" => Ok(DeclarationStatus::Submitted),
            "ACCEPTED" => Ok(DeclarationStatus::Accepted),
            "REJECTED" => Ok(DeclarationStatus::Rejected),
            _ => Err(format!("Invalid declaration status: {}", s)),
        }
    }
}

impl std::fmt::Display for DeclarationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclarationStatus::Draft => write!(f, "DRAFT"),
            DeclarationStatus::Validated => write!(f, "VALIDATED"),
            DeclarationStatus::AwaitingConsent => write!(f, "AWAITING_CONSENT"),
            DeclarationStatus::Signed => write!(f, "SIGNED"),
            DeclarationStatus::Submitted => write!(f, "SUBMITTED"),
            DeclarationStatus::Accepted => write!(f, "ACCEPTED"),
            DeclarationStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemSource {
    RuleEngine,
    Manual,
}

impl FromStr for ItemSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RULE_ENGINE" => Ok(ItemSource::RuleEngine),
            "MANUAL" => Ok(ItemSource::Manual),
            _ => Err(format!("Invalid item source: {}", s)),
        }
    }
}

impl std::fmt::Display for ItemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemSource::RuleEngine => write!(f, "RULE_ENGINE"),
            ItemSource::Manual => write!(f, "MANUAL"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind {
    Schema,
    Business,
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SCHEMA" => Ok(ReportKind::Schema),
            "BUSINESS" => Ok(ReportKind::Business),
            _ => Err(format!("Invalid report kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::Schema => write!(f, "SCHEMA"),
            ReportKind::Business => write!(f, "BUSINESS"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Taxpayer {
    pub id: Uuid,
    pub iin: String,
    pub kind: TaxpayerKind,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub resident: bool,
    pub spouse_iin: Option<String>,
    pub legal_rep_iin: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceRecord {
    pub id: Uuid,
    pub taxpayer_id: Uuid,
    pub source_kind: SourceKind,
    pub external_id: Option<String>,
    pub checksum: String,
    pub raw_payload: serde_json::Value,
    pub imported_at: chrono::DateTime<chrono::Utc>,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaxEvent {
    pub id: Uuid,
    pub taxpayer_id: Uuid,
    pub source_record_id: Option<Uuid>,
    pub event_type: String,
    pub event_date: NaiveDate,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub metadata: serde_json::Value,
    pub tax_year: i32,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Parser output: a normalized event not yet attributed an id. The
/// taxpayer and source-record ids are attached at insert time from the
/// source record itself, never trusted from the payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaxEventInput {
    pub event_type: String,
    pub event_date: NaiveDate,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventTypeCode {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogicalField {
    pub code: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaxRule {
    pub id: Uuid,
    pub rule_code: String,
    pub tax_year: Option<i32>,
    pub kind: RuleKind,
    pub conditions: serde_json::Value,
    pub actions: serde_json::Value,
    pub priority: i32,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct XmlFieldMap {
    pub form_code: String,
    pub application_code: String,
    pub logical_field: Option<String>,
    pub xml_field_name: String,
    pub position: i32,
}

/// Taxpayer attributes copied onto the declaration at first generation.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DeclarationHeader {
    pub iin: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub spouse_iin: Option<String>,
    pub legal_rep_iin: Option<String>,
}

impl DeclarationHeader {
    pub fn from_taxpayer(taxpayer: &Taxpayer) -> Self {
        Self {
            iin: taxpayer.iin.clone(),
            last_name: taxpayer.last_name.clone(),
            first_name: taxpayer.first_name.clone(),
            middle_name: taxpayer.middle_name.clone(),
            phone: taxpayer.phone.clone(),
            email: taxpayer.email.clone(),
            spouse_iin: taxpayer.spouse_iin.clone(),
            legal_rep_iin: taxpayer.legal_rep_iin.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Declaration {
    pub id: Uuid,
    pub taxpayer_id: Uuid,
    pub tax_year: i32,
    pub form_code: String,
    pub kind: DeclarationKind,
    pub status: DeclarationStatus,
    pub header: DeclarationHeader,
    pub flags: BTreeMap<String, bool>,
    pub validated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub exported_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeclarationItem {
    pub id: Uuid,
    pub declaration_id: Uuid,
    pub logical_field: String,
    pub value: Decimal,
    pub source: ItemSource,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationReport {
    pub id: Uuid,
    pub declaration_id: Uuid,
    pub kind: ReportKind,
    pub is_valid: bool,
    pub report: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct XmlExport {
    pub id: Uuid,
    pub declaration_id: Uuid,
    pub payload: String,
    pub schema_version: i32,
    pub content_hash: String,
    pub signed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Form code of the declaration this service files.
pub const FORM_270: &str = "270.00";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            DeclarationStatus::Draft,
            DeclarationStatus::Validated,
            DeclarationStatus::AwaitingConsent,
            DeclarationStatus::Signed,
            DeclarationStatus::Submitted,
            DeclarationStatus::Accepted,
            DeclarationStatus::Rejected,
        ] {
            let parsed: DeclarationStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_source_kind_parse_is_case_insensitive() {
        assert_eq!("bank".parse::<SourceKind>().unwrap(), SourceKind::Bank);
        assert_eq!("Excel".parse::<SourceKind>().unwrap(), SourceKind::Excel);
        assert!("ftp".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_header_snapshot_copies_taxpayer() {
        let taxpayer = Taxpayer {
            id: Uuid::new_v4(),
            iin: "850615300123".to_string(),
            kind: TaxpayerKind::Individual,
            last_name: "Akhmetova".to_string(),
            first_name: "Aliya".to_string(),
            middle_name: None,
            phone: Some("+77011234567".to_string()),
            email: Some("aliya@example.kz".to_string()),
            resident: true,
            spouse_iin: None,
            legal_rep_iin: None,
            created_at: chrono::Utc::now(),
        };
        let header = DeclarationHeader::from_taxpayer(&taxpayer);
        assert_eq!(header.iin, taxpayer.iin);
        assert_eq!(header.last_name, "Akhmetova");
        assert_eq!(header.email.as_deref(), Some("aliya@example.kz"));
    }
}
