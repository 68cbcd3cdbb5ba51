//! Storage-level predicates over column names.
//!
//! A `Predicate` is what a translated filter becomes: it names storage
//! columns, not object-type fields, and carries storage-typed values. Stores
//! evaluate it against their rows with `Predicate::matches`.

use crate::StorageRow;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Predicate tree over storage columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: JsonValue,
    },
    In {
        column: String,
        values: Vec<JsonValue>,
    },
    IsNull {
        column: String,
    },
    IsNotNull {
        column: String,
    },
    Like {
        column: String,
        pattern: String,
        case_insensitive: bool,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: JsonValue) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: JsonValue) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn in_list(column: impl Into<String>, values: Vec<JsonValue>) -> Self {
        Self::In {
            column: column.into(),
            values,
        }
    }

    /// Evaluate against a row. Missing columns read as NULL, and any
    /// comparison involving NULL is false, as in SQL.
    pub fn matches(&self, row: &StorageRow) -> bool {
        match self {
            Predicate::Compare { column, op, value } => {
                let Some(actual) = non_null(row, column) else {
                    return false;
                };
                if value.is_null() {
                    return false;
                }
                match op {
                    CompareOp::Eq => values_equal(actual, value),
                    CompareOp::Neq => !values_equal(actual, value),
                    CompareOp::Gt => compare_values(actual, value) == Some(Ordering::Greater),
                    CompareOp::Gte => matches!(
                        compare_values(actual, value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    CompareOp::Lt => compare_values(actual, value) == Some(Ordering::Less),
                    CompareOp::Lte => matches!(
                        compare_values(actual, value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                }
            }
            Predicate::In { column, values } => match non_null(row, column) {
                Some(actual) => values.iter().any(|v| values_equal(actual, v)),
                None => false,
            },
            Predicate::IsNull { column } => non_null(row, column).is_none(),
            Predicate::IsNotNull { column } => non_null(row, column).is_some(),
            Predicate::Like {
                column,
                pattern,
                case_insensitive,
            } => match non_null(row, column).and_then(JsonValue::as_str) {
                Some(text) => like_regex(pattern, *case_insensitive)
                    .map(|re| re.is_match(text))
                    .unwrap_or(false),
                None => false,
            },
            Predicate::And(children) => children.iter().all(|p| p.matches(row)),
            Predicate::Or(children) => children.iter().any(|p| p.matches(row)),
            Predicate::Not(inner) => !inner.matches(row),
        }
    }

    /// Every column the predicate reads, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { column, .. }
            | Predicate::In { column, .. }
            | Predicate::IsNull { column }
            | Predicate::IsNotNull { column }
            | Predicate::Like { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
        }
    }
}

fn non_null<'a>(row: &'a StorageRow, column: &str) -> Option<&'a JsonValue> {
    row.get(column).filter(|v| !v.is_null())
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Compile a SQL LIKE pattern (`%`, `_`) into an anchored regex.
pub(crate) fn like_regex(pattern: &str, case_insensitive: bool) -> Option<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    if case_insensitive {
        source.push_str("(?i)");
    }
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, JsonValue)]) -> StorageRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_compare_numbers_and_strings() {
        let r = row(&[("employees", json!(10)), ("name", json!("Acme"))]);
        assert!(Predicate::compare("employees", CompareOp::Gt, json!(5)).matches(&r));
        assert!(Predicate::compare("employees", CompareOp::Lte, json!(10.0)).matches(&r));
        assert!(Predicate::eq("employees", json!(10.0)).matches(&r));
        assert!(!Predicate::compare("name", CompareOp::Lt, json!("Aaa")).matches(&r));
        assert!(!Predicate::compare("employees", CompareOp::Gt, json!("5")).matches(&r));
    }

    #[test]
    fn test_null_semantics() {
        let r = row(&[("name", JsonValue::Null)]);
        assert!(Predicate::IsNull { column: "name".into() }.matches(&r));
        assert!(Predicate::IsNull { column: "missing".into() }.matches(&r));
        assert!(!Predicate::eq("name", json!("x")).matches(&r));
        assert!(!Predicate::compare("name", CompareOp::Neq, json!("x")).matches(&r));
    }

    #[test]
    fn test_in_list() {
        let r = row(&[("id", json!("a"))]);
        assert!(Predicate::in_list("id", vec![json!("b"), json!("a")]).matches(&r));
        assert!(!Predicate::in_list("id", vec![]).matches(&r));
    }

    #[test]
    fn test_like_patterns() {
        let r = row(&[("name", json!("Acme Corp (EU)"))]);
        let like = |pattern: &str, ci: bool| Predicate::Like {
            column: "name".into(),
            pattern: pattern.into(),
            case_insensitive: ci,
        };
        assert!(like("Acme%", false).matches(&r));
        assert!(!like("acme%", false).matches(&r));
        assert!(like("acme%", true).matches(&r));
        assert!(like("%(EU)", false).matches(&r));
        assert!(like("Acme Cor_ (EU)", false).matches(&r));
    }

    #[test]
    fn test_logical_combinators() {
        let r = row(&[("a", json!(1)), ("b", json!(2))]);
        let a1 = Predicate::eq("a", json!(1));
        let b3 = Predicate::eq("b", json!(3));
        assert!(!Predicate::And(vec![a1.clone(), b3.clone()]).matches(&r));
        assert!(Predicate::Or(vec![a1, b3.clone()]).matches(&r));
        assert!(Predicate::Not(Box::new(b3)).matches(&r));
        assert!(Predicate::And(vec![]).matches(&r));
        assert!(!Predicate::Or(vec![]).matches(&r));
    }

    #[test]
    fn test_columns_deduplicated_in_order() {
        let predicate = Predicate::Or(vec![
            Predicate::in_list("id", vec![json!("a")]),
            Predicate::Not(Box::new(Predicate::And(vec![
                Predicate::IsNull { column: "name".into() },
                Predicate::eq("id", json!("b")),
            ]))),
        ]);
        assert_eq!(predicate.columns(), vec!["id", "name"]);
        assert!(Predicate::And(vec![]).columns().is_empty());
    }
}
