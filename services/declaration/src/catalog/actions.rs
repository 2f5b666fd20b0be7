//! Rule actions decoded from the persisted JSON into tagged variants.
//! Decoding happens once per engine run, before any phase executes, so a
//! malformed catalog record fails the run up front instead of mid-phase.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::engine::formula::Formula;
use crate::models::RuleKind;

#[derive(Debug, Clone, PartialEq)]
pub enum AmountSource {
    /// The event's own amount (the default).
    EventAmount,
    /// A numeric value at a dotted path inside the event metadata.
    Metadata(String),
    /// A constant carried by the action itself.
    Fixed(Decimal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapAction {
    pub target: String,
    pub amount_source: AmountSource,
    pub multiplier: Option<Decimal>,
    pub round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalcAction {
    pub target: String,
    pub formula: Formula,
    pub round: Option<u32>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagAction {
    pub set: Vec<(String, bool)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleAction {
    Exclude,
    Map(MapAction),
    Calc(CalcAction),
    Flag(FlagAction),
}

/// Reads a decimal out of a JSON number or numeric string.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Decodes the persisted `actions` JSON of one rule. Accepts a single
/// action object or an array of them. The action set must be coherent
/// with the rule kind: mapping rules carry `map` (plus inline `flag`)
/// actions, exclusion rules `exclude`, calculation rules `calc`, flag
/// rules `flag`.
pub fn decode_actions(kind: RuleKind, raw: &Value) -> Result<Vec<RuleAction>, String> {
    let entries: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![raw],
        Value::Null => vec![],
        other => return Err(format!("actions must be an object or array, got {}", other)),
    };

    if entries.is_empty() && kind != RuleKind::Exclusion {
        return Err("rule has no actions".to_string());
    }

    let mut actions = Vec::with_capacity(entries.len().max(1));
    for entry in entries {
        actions.push(decode_one(entry)?);
    }
    if actions.is_empty() {
        // An exclusion rule with an empty action list still excludes.
        actions.push(RuleAction::Exclude);
    }

    for action in &actions {
        let coherent = match (kind, action) {
            (RuleKind::Exclusion, RuleAction::Exclude) => true,
            (RuleKind::Mapping, RuleAction::Map(_)) => true,
            (RuleKind::Mapping, RuleAction::Flag(_)) => true,
            (RuleKind::Calculation, RuleAction::Calc(_)) => true,
            (RuleKind::Flag, RuleAction::Flag(_)) => true,
            _ => false,
        };
        if !coherent {
            return Err(format!("{} action is not valid on a {} rule", action_name(action), kind));
        }
    }

    Ok(actions)
}

fn action_name(action: &RuleAction) -> &'static str {
    match action {
        RuleAction::Exclude => "exclude",
        RuleAction::Map(_) => "map",
        RuleAction::Calc(_) => "calc",
        RuleAction::Flag(_) => "flag",
    }
}

fn decode_one(entry: &Value) -> Result<RuleAction, String> {
    let obj = entry
        .as_object()
        .ok_or_else(|| format!("action must be an object, got {}", entry))?;
    let name = obj
        .get("action")
        .and_then(Value::as_str)
        .ok_or("action object is missing the \"action\" discriminator")?;

    match name {
        "exclude" => Ok(RuleAction::Exclude),
        "map" => {
            let target = required_target(obj)?;
            let amount_source = decode_amount_source(obj)?;
            let multiplier = obj.get("multiplier").map(|v| {
                decimal_from_value(v).ok_or_else(|| format!("bad multiplier: {}", v))
            }).transpose()?;
            let round = decode_round(obj)?;
            Ok(RuleAction::Map(MapAction { target, amount_source, multiplier, round }))
        }
        "calc" => {
            let target = required_target(obj)?;
            let formula_value = obj
                .get("formula")
                .ok_or("calc action is missing \"formula\"")?;
            let formula = match formula_value {
                Value::String(text) => Formula::parse_legacy(text)?,
                other => Formula::from_value(other)?,
            };
            let round = decode_round(obj)?;
            let min = obj.get("min").map(|v| {
                decimal_from_value(v).ok_or_else(|| format!("bad min: {}", v))
            }).transpose()?;
            let max = obj.get("max").map(|v| {
                decimal_from_value(v).ok_or_else(|| format!("bad max: {}", v))
            }).transpose()?;
            Ok(RuleAction::Calc(CalcAction { target, formula, round, min, max }))
        }
        "flag" => {
            let set = obj
                .get("set")
                .and_then(Value::as_object)
                .ok_or("flag action is missing the \"set\" object")?;
            let mut pairs = Vec::with_capacity(set.len());
            for (flag, value) in set {
                let value = value
                    .as_bool()
                    .ok_or_else(|| format!("flag {} must be boolean", flag))?;
                pairs.push((flag.clone(), value));
            }
            Ok(RuleAction::Flag(FlagAction { set: pairs }))
        }
        other => Err(format!("unknown action: {}", other)),
    }
}

fn required_target(obj: &serde_json::Map<String, Value>) -> Result<String, String> {
    let target = obj
        .get("target")
        .or_else(|| obj.get("logical_field"))
        .and_then(Value::as_str)
        .ok_or("action is missing \"target\"")?;
    if !target.starts_with("LF_") {
        return Err(format!("target {} is not a logical field code", target));
    }
    Ok(target.to_string())
}

fn decode_round(obj: &serde_json::Map<String, Value>) -> Result<Option<u32>, String> {
    match obj.get("round") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as u32))
            .ok_or_else(|| format!("bad round precision: {}", value)),
    }
}

fn decode_amount_source(obj: &serde_json::Map<String, Value>) -> Result<AmountSource, String> {
    if let Some(value) = obj.get("amount_source") {
        return match value {
            Value::String(s) if s == "event.amount" => Ok(AmountSource::EventAmount),
            Value::String(s) if s.starts_with("event.metadata.") => {
                Ok(AmountSource::Metadata(s["event.metadata.".len()..].to_string()))
            }
            Value::String(s) if s.starts_with("metadata.") => {
                Ok(AmountSource::Metadata(s["metadata.".len()..].to_string()))
            }
            other => decimal_from_value(other)
                .map(AmountSource::Fixed)
                .ok_or_else(|| format!("bad amount_source: {}", other)),
        };
    }
    if let Some(fixed) = obj.get("amount") {
        return decimal_from_value(fixed)
            .map(AmountSource::Fixed)
            .ok_or_else(|| format!("bad fixed amount: {}", fixed));
    }
    Ok(AmountSource::EventAmount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn test_decode_map_action_defaults() {
        let actions =
            decode_actions(RuleKind::Mapping, &json!([{"action": "map", "target": "LF_INCOME_WINNINGS"}]))
                .unwrap();
        assert_eq!(
            actions,
            vec![RuleAction::Map(MapAction {
                target: "LF_INCOME_WINNINGS".to_string(),
                amount_source: AmountSource::EventAmount,
                multiplier: None,
                round: None,
            })]
        );
    }

    #[test]
    fn test_decode_map_with_metadata_source_and_multiplier() {
        let actions = decode_actions(
            RuleKind::Mapping,
            &json!([{
                "action": "map",
                "target": "LF_CFC_PROFIT",
                "amount_source": "event.metadata.profit_share",
                "multiplier": "0.5",
                "round": 2
            }]),
        )
        .unwrap();
        match &actions[0] {
            RuleAction::Map(map) => {
                assert_eq!(map.amount_source, AmountSource::Metadata("profit_share".to_string()));
                assert_eq!(map.multiplier, Some(Decimal::new(5, 1)));
                assert_eq!(map.round, Some(2));
            }
            other => panic!("expected map action, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_fixed_amount() {
        let actions = decode_actions(
            RuleKind::Mapping,
            &json!({"action": "map", "target": "LF_DEDUCTION_STANDARD", "amount": 85000}),
        )
        .unwrap();
        match &actions[0] {
            RuleAction::Map(map) => {
                assert_eq!(map.amount_source, AmountSource::Fixed(Decimal::new(85000, 0)));
            }
            other => panic!("expected map action, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_calc_with_legacy_formula() {
        let actions = decode_actions(
            RuleKind::Calculation,
            &json!([{"action": "calc", "target": "LF_INCOME_TOTAL", "formula": "SUM(LF_INCOME_WINNINGS, LF_CFC_PROFIT)"}]),
        )
        .unwrap();
        assert!(matches!(actions[0], RuleAction::Calc(_)));
    }

    #[test]
    fn test_kind_coherence_enforced() {
        let err = decode_actions(
            RuleKind::Exclusion,
            &json!([{"action": "map", "target": "LF_INCOME_TOTAL"}]),
        )
        .unwrap_err();
        assert!(err.contains("not valid"));
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(decode_actions(RuleKind::Flag, &json!([{"action": "teleport"}])).is_err());
    }

    #[test]
    fn test_flag_set_must_be_boolean() {
        assert!(decode_actions(RuleKind::Flag, &json!([{"action": "flag", "set": {"pril_2": "yes"}}])).is_err());
    }

    #[test]
    fn test_exclusion_rule_with_empty_actions() {
        let actions = decode_actions(RuleKind::Exclusion, &json!([])).unwrap();
        assert_eq!(actions, vec![RuleAction::Exclude]);
    }

    #[test]
    fn test_target_must_be_logical_field() {
        assert!(decode_actions(
            RuleKind::Mapping,
            &json!([{"action": "map", "target": "INCOME_TOTAL"}])
        )
        .is_err());
    }
}
