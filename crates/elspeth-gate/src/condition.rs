//! The condition expression language evaluated by gates and by aggregation
//! CONDITION triggers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GateError {
    #[error("field {0:?} is missing from the row")]
    MissingField(String),
    #[error("field {field:?} has value {value} which cannot be compared with {comparison:?}")]
    NotComparable { field: String, value: Value, comparison: Comparison },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        };
        write!(f, "{}", s)
    }
}

/// A boolean condition over a row, built from field comparisons combined
/// with and/or/not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Compare { field: String, comparison: Comparison, value: Value },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Always(bool),
}

impl Condition {
    pub fn compare(field: impl Into<String>, comparison: Comparison, value: Value) -> Self {
        Condition::Compare { field: field.into(), comparison, value }
    }

    pub fn eval(&self, row: &Value) -> Result<bool, GateError> {
        match self {
            Condition::Always(b) => Ok(*b),
            Condition::Not(inner) => Ok(!inner.eval(row)?),
            Condition::And(parts) => {
                for p in parts {
                    if !p.eval(row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(parts) => {
                for p in parts {
                    if p.eval(row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Compare { field, comparison, value } => {
                let actual = row
                    .get(field)
                    .ok_or_else(|| GateError::MissingField(field.clone()))?;
                compare(actual, *comparison, value).ok_or_else(|| GateError::NotComparable {
                    field: field.clone(),
                    value: actual.clone(),
                    comparison: *comparison,
                })
            }
        }
    }
}

fn compare(actual: &Value, comparison: Comparison, expected: &Value) -> Option<bool> {
    if matches!(comparison, Comparison::Eq) {
        return Some(actual == expected);
    }
    if matches!(comparison, Comparison::Ne) {
        return Some(actual != expected);
    }
    let (a, b) = (actual.as_f64()?, expected.as_f64()?);
    Some(match comparison {
        Comparison::Gt => a > b,
        Comparison::Gte => a >= b,
        Comparison::Lt => a < b,
        Comparison::Lte => a <= b,
        Comparison::Eq | Comparison::Ne => unreachable!(),
    })
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always(b) => write!(f, "{}", b),
            Condition::Not(inner) => write!(f, "not ({})", inner),
            Condition::And(parts) => {
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " and ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Condition::Or(parts) => {
                write!(f, "(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Condition::Compare { field, comparison, value } => {
                write!(f, "row.{} {} {}", field, comparison, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compares_numbers() {
        let c = Condition::compare("score", Comparison::Gt, json!(3));
        assert!(c.eval(&json!({"score": 5})).unwrap());
        assert!(!c.eval(&json!({"score": 2})).unwrap());
    }

    #[test]
    fn missing_field_is_an_error_not_false() {
        let c = Condition::compare("score", Comparison::Gt, json!(3));
        assert_eq!(c.eval(&json!({})), Err(GateError::MissingField("score".into())));
    }

    #[test]
    fn and_or_not_compose() {
        let c = Condition::And(vec![
            Condition::compare("a", Comparison::Eq, json!(1)),
            Condition::Or(vec![
                Condition::compare("b", Comparison::Gt, json!(10)),
                Condition::compare("b", Comparison::Lt, json!(0)),
            ]),
        ]);
        assert!(c.eval(&json!({"a": 1, "b": 20})).unwrap());
        assert!(!c.eval(&json!({"a": 1, "b": 5})).unwrap());
    }

    #[test]
    fn display_is_stable_for_hashing() {
        let c = Condition::compare("score", Comparison::Gt, json!(3));
        assert_eq!(c.to_string(), "row.score > 3");
    }
}
