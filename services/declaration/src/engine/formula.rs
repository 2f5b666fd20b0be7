//! Arithmetic formulas used by calculation rules. Formulas are decoded
//! from JSON into an AST once at rule-decode time; evaluation is total —
//! missing field references read as zero and division by zero yields
//! zero, so a well-formed formula can never fail mid-run.

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Num(Decimal),
    Ref(String),
    Sum(Vec<Formula>),
    Sub(Box<Formula>, Box<Formula>),
    Mul(Box<Formula>, Box<Formula>),
    Div(Box<Formula>, Box<Formula>),
    Max(Vec<Formula>),
    Min(Vec<Formula>),
    Round(Box<Formula>, u32),
    Floor(Box<Formula>),
    Ceil(Box<Formula>),
    Abs(Box<Formula>),
    Percent(Box<Formula>, Box<Formula>),
    If {
        cond: Box<Formula>,
        then: Box<Formula>,
        otherwise: Box<Formula>,
    },
    Cmp(CmpOp, Box<Formula>, Box<Formula>),
}

impl Formula {
    /// Evaluates against the current logical-field map. Missing
    /// references are zero.
    pub fn eval(&self, fields: &BTreeMap<String, Decimal>) -> Decimal {
        match self {
            Formula::Num(n) => *n,
            Formula::Ref(code) => fields.get(code).copied().unwrap_or(Decimal::ZERO),
            Formula::Sum(operands) => operands.iter().map(|f| f.eval(fields)).sum(),
            Formula::Sub(a, b) => a.eval(fields) - b.eval(fields),
            Formula::Mul(a, b) => a.eval(fields) * b.eval(fields),
            Formula::Div(a, b) => {
                let divisor = b.eval(fields);
                if divisor.is_zero() {
                    Decimal::ZERO
                } else {
                    a.eval(fields) / divisor
                }
            }
            // max carries an implicit zero floor
            Formula::Max(operands) => operands
                .iter()
                .map(|f| f.eval(fields))
                .fold(Decimal::ZERO, Decimal::max),
            Formula::Min(operands) => {
                let mut values = operands.iter().map(|f| f.eval(fields));
                match values.next() {
                    Some(first) => values.fold(first, Decimal::min),
                    None => Decimal::ZERO,
                }
            }
            Formula::Round(a, precision) => a
                .eval(fields)
                .round_dp_with_strategy(*precision, RoundingStrategy::MidpointAwayFromZero),
            Formula::Floor(a) => a.eval(fields).floor(),
            Formula::Ceil(a) => a.eval(fields).ceil(),
            Formula::Abs(a) => a.eval(fields).abs(),
            Formula::Percent(a, b) => a.eval(fields) * b.eval(fields) / Decimal::ONE_HUNDRED,
            Formula::If { cond, then, otherwise } => {
                if cond.eval(fields) > Decimal::ZERO {
                    then.eval(fields)
                } else {
                    otherwise.eval(fields)
                }
            }
            Formula::Cmp(op, a, b) => {
                let a = a.eval(fields);
                let b = b.eval(fields);
                let holds = match op {
                    CmpOp::Gt => a > b,
                    CmpOp::Gte => a >= b,
                    CmpOp::Lt => a < b,
                    CmpOp::Lte => a <= b,
                    CmpOp::Eq => a == b,
                };
                if holds {
                    Decimal::ONE
                } else {
                    Decimal::ZERO
                }
            }
        }
    }

    /// Logical fields this formula reads. Used to reject self-referencing
    /// calculation rules at catalog load.
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Formula::Num(_) => {}
            Formula::Ref(code) => refs.push(code),
            Formula::Sum(operands) | Formula::Max(operands) | Formula::Min(operands) => {
                for operand in operands {
                    operand.collect_references(refs);
                }
            }
            Formula::Sub(a, b)
            | Formula::Mul(a, b)
            | Formula::Div(a, b)
            | Formula::Percent(a, b)
            | Formula::Cmp(_, a, b) => {
                a.collect_references(refs);
                b.collect_references(refs);
            }
            Formula::Round(a, _) | Formula::Floor(a) | Formula::Ceil(a) | Formula::Abs(a) => {
                a.collect_references(refs)
            }
            Formula::If { cond, then, otherwise } => {
                cond.collect_references(refs);
                then.collect_references(refs);
                otherwise.collect_references(refs);
            }
        }
    }

    /// Decodes the structured JSON form: a number literal, a
    /// `{"ref": "LF_*"}` lookup, or an `{"op": ..., ...}` operation.
    pub fn from_value(value: &Value) -> Result<Formula, String> {
        match value {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .map(Formula::Num)
                .map_err(|_| format!("bad number literal: {}", n)),
            Value::String(s) => Decimal::from_str(s.trim())
                .map(Formula::Num)
                .map_err(|_| format!("bad number literal: {}", s)),
            Value::Object(obj) => {
                if let Some(reference) = obj.get("ref") {
                    let code = reference
                        .as_str()
                        .ok_or_else(|| format!("bad ref: {}", reference))?;
                    return Ok(Formula::Ref(code.to_string()));
                }
                let op = obj
                    .get("op")
                    .and_then(Value::as_str)
                    .ok_or("formula object needs \"op\" or \"ref\"")?;
                Self::decode_op(op, obj)
            }
            other => Err(format!("bad formula: {}", other)),
        }
    }

    fn decode_op(op: &str, obj: &serde_json::Map<String, Value>) -> Result<Formula, String> {
        match op {
            "sum" => Ok(Formula::Sum(Self::operands(obj)?)),
            "max" => Ok(Formula::Max(Self::operands(obj)?)),
            "min" => Ok(Formula::Min(Self::operands(obj)?)),
            "sub" => {
                let (a, b) = Self::pair(obj)?;
                Ok(Formula::Sub(Box::new(a), Box::new(b)))
            }
            "mul" => {
                let (a, b) = Self::pair(obj)?;
                Ok(Formula::Mul(Box::new(a), Box::new(b)))
            }
            "div" => {
                let (a, b) = Self::pair(obj)?;
                Ok(Formula::Div(Box::new(a), Box::new(b)))
            }
            "percent" => {
                let (a, b) = Self::pair(obj)?;
                Ok(Formula::Percent(Box::new(a), Box::new(b)))
            }
            "round" => {
                let a = Self::unary(obj)?;
                let precision = match obj.get("b") {
                    None | Some(Value::Null) => 0,
                    Some(value) => value
                        .as_u64()
                        .ok_or_else(|| format!("bad round precision: {}", value))?
                        as u32,
                };
                Ok(Formula::Round(Box::new(a), precision))
            }
            "floor" => Ok(Formula::Floor(Box::new(Self::unary(obj)?))),
            "ceil" => Ok(Formula::Ceil(Box::new(Self::unary(obj)?))),
            "abs" => Ok(Formula::Abs(Box::new(Self::unary(obj)?))),
            "if" => {
                let cond = obj.get("cond").ok_or("if needs \"cond\"")?;
                let then = obj.get("then").ok_or("if needs \"then\"")?;
                let otherwise = match obj.get("else") {
                    None | Some(Value::Null) => Formula::Num(Decimal::ZERO),
                    Some(value) => Self::from_value(value)?,
                };
                Ok(Formula::If {
                    cond: Box::new(Self::from_value(cond)?),
                    then: Box::new(Self::from_value(then)?),
                    otherwise: Box::new(otherwise),
                })
            }
            "gt" | "gte" | "lt" | "lte" | "eq" => {
                let cmp = match op {
                    "gt" => CmpOp::Gt,
                    "gte" => CmpOp::Gte,
                    "lt" => CmpOp::Lt,
                    "lte" => CmpOp::Lte,
                    _ => CmpOp::Eq,
                };
                let (a, b) = Self::pair(obj)?;
                Ok(Formula::Cmp(cmp, Box::new(a), Box::new(b)))
            }
            other => Err(format!("unknown formula op: {}", other)),
        }
    }

    /// n-ary operand list: `refs: [...]` (strings are field references),
    /// or the two-operand `a`/`b` form.
    fn operands(obj: &serde_json::Map<String, Value>) -> Result<Vec<Formula>, String> {
        if let Some(refs) = obj.get("refs") {
            let items = refs
                .as_array()
                .ok_or_else(|| format!("refs must be an array, got {}", refs))?;
            return items
                .iter()
                .map(|item| match item {
                    Value::String(code) if code.starts_with("LF_") => {
                        Ok(Formula::Ref(code.clone()))
                    }
                    other => Self::from_value(other),
                })
                .collect();
        }
        let (a, b) = Self::pair(obj)?;
        Ok(vec![a, b])
    }

    fn pair(obj: &serde_json::Map<String, Value>) -> Result<(Formula, Formula), String> {
        let a = obj.get("a").ok_or("operation needs \"a\"")?;
        let b = obj.get("b").ok_or("operation needs \"b\"")?;
        Ok((Self::from_value(a)?, Self::from_value(b)?))
    }

    fn unary(obj: &serde_json::Map<String, Value>) -> Result<Formula, String> {
        let a = obj.get("a").ok_or("operation needs \"a\"")?;
        Self::from_value(a)
    }

    /// Parses the legacy textual form: `SUM(LF_A, LF_B, …)`,
    /// `SUB(LF_A, LF_B, …)` (left-associative), `MUL(LF_A, 0.10)`,
    /// `MIN(...)`, `MAX(...)`. Arguments are field codes or number
    /// literals.
    pub fn parse_legacy(text: &str) -> Result<Formula, String> {
        let trimmed = text.trim();
        let open = trimmed
            .find('(')
            .ok_or_else(|| format!("bad legacy formula: {}", text))?;
        if !trimmed.ends_with(')') {
            return Err(format!("bad legacy formula: {}", text));
        }

        let name = trimmed[..open].trim().to_uppercase();
        let body = &trimmed[open + 1..trimmed.len() - 1];
        let args: Vec<Formula> = body
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| {
                if token.starts_with("LF_") {
                    Ok(Formula::Ref(token.to_string()))
                } else {
                    Decimal::from_str(token)
                        .map(Formula::Num)
                        .map_err(|_| format!("bad legacy operand: {}", token))
                }
            })
            .collect::<Result<_, _>>()?;

        if args.is_empty() {
            return Err(format!("legacy formula has no operands: {}", text));
        }

        match name.as_str() {
            "SUM" => Ok(Formula::Sum(args)),
            "MAX" => Ok(Formula::Max(args)),
            "MIN" => Ok(Formula::Min(args)),
            "SUB" => fold_left(args, |a, b| Formula::Sub(Box::new(a), Box::new(b)))
                .ok_or_else(|| format!("legacy formula has no operands: {}", text)),
            "MUL" => fold_left(args, |a, b| Formula::Mul(Box::new(a), Box::new(b)))
                .ok_or_else(|| format!("legacy formula has no operands: {}", text)),
            other => Err(format!("unknown legacy formula: {}", other)),
        }
    }
}

fn fold_left(
    args: Vec<Formula>,
    combine: impl Fn(Formula, Formula) -> Formula,
) -> Option<Formula> {
    let mut iter = args.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, combine))
}
