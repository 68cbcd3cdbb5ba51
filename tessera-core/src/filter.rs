//! Filter expressions for record queries
//!
//! Callers send filters as GraphQL-style JSON:
//!
//! ```text
//! { "id": { "in": ["..."] } }
//! { "amount": { "amountMicros": { "gt": 1000 } } }
//! { "or": [ { "status": { "eq": "OPEN" } }, { "name": { "ilike": "%acme%" } } ] }
//! ```
//!
//! `FilterExpr::from_json` turns that into a typed tree without consulting any
//! schema. Field resolution and operator/field-kind checks happen later, when
//! the tree is translated against an object type.

use crate::error::FilterError;
use crate::identity::PRIMARY_KEY_FIELD;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Filter operator for field comparisons.
///
/// Unknown operator names are kept as `Unsupported` so the tree always parses;
/// translation rejects them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Neq,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// In list of values
    In,
    /// `NULL` / `NOT_NULL` check
    Is,
    /// SQL LIKE pattern, case-sensitive
    Like,
    /// SQL LIKE pattern, case-insensitive
    Ilike,
    /// String prefix
    StartsWith,
    /// Anything else the caller sent
    Unsupported(String),
}

impl FilterOperator {
    /// Parse an operator key from the filter JSON.
    pub fn parse(name: &str) -> Self {
        match name {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "in" => Self::In,
            "is" => Self::Is,
            "like" => Self::Like,
            "ilike" => Self::Ilike,
            "startsWith" => Self::StartsWith,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// The operator key as it appears in filter JSON.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Is => "is",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::StartsWith => "startsWith",
            Self::Unsupported(name) => name,
        }
    }

    /// Whether this key names a known operator.
    pub fn is_known(name: &str) -> bool {
        !matches!(Self::parse(name), Self::Unsupported(_))
    }
}

/// A single `field <op> value` leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Field name on the object type
    pub field: String,
    /// Composite sub-field (e.g. `amountMicros` on a currency field)
    pub sub_field: Option<String>,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against
    pub value: JsonValue,
}

/// Filter expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterExpr {
    Condition(FilterCondition),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Create a condition on a plain field.
    pub fn condition(field: impl Into<String>, operator: FilterOperator, value: JsonValue) -> Self {
        Self::Condition(FilterCondition {
            field: field.into(),
            sub_field: None,
            operator,
            value,
        })
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: JsonValue) -> Self {
        Self::condition(field, FilterOperator::Eq, value)
    }

    /// Create a set-membership filter.
    pub fn in_list(field: impl Into<String>, values: Vec<JsonValue>) -> Self {
        Self::condition(field, FilterOperator::In, JsonValue::Array(values))
    }

    /// Create an `id in [...]` filter.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::in_list(
            PRIMARY_KEY_FIELD,
            ids.into_iter().map(|id| JsonValue::String(id.into())).collect(),
        )
    }

    pub fn and(self, rhs: FilterExpr) -> Self {
        Self::And(vec![self, rhs])
    }

    pub fn or(self, rhs: FilterExpr) -> Self {
        Self::Or(vec![self, rhs])
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Parse the caller's JSON filter.
    ///
    /// Only the filter as a whole may be empty (`{}`, `{"and": []}`), which
    /// yields an empty tree. An empty object or list anywhere below the top
    /// level is malformed.
    pub fn from_json(value: &JsonValue) -> Result<Self, FilterError> {
        let object = expect_object(value)?;
        let blank_root = object.is_empty()
            || (object.len() == 1
                && object.iter().all(|(key, node)| {
                    matches!(key.as_str(), "and" | "or")
                        && node.as_array().is_some_and(Vec::is_empty)
                }));
        if blank_root {
            return Ok(Self::And(Vec::new()));
        }
        parse_object(object)
    }

    /// Maximum nesting depth of the tree. A bare condition has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Self::Condition(_) => 1,
            Self::Not(inner) => 1 + inner.depth(),
            Self::And(children) | Self::Or(children) => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }

    /// All leaf conditions, depth-first.
    pub fn conditions(&self) -> Vec<&FilterCondition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a FilterCondition>) {
        match self {
            Self::Condition(condition) => out.push(condition),
            Self::Not(inner) => inner.collect_conditions(out),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
        }
    }

    /// True when the tree holds no condition at all (`{}`, `{"and": []}`).
    pub fn is_empty(&self) -> bool {
        self.conditions().is_empty()
    }

    /// Every value compared against the primary key by `eq` or `in`.
    ///
    /// Non-string values are returned as their JSON text so validation can
    /// reject them as identifiers.
    pub fn identifier_values(&self) -> Vec<String> {
        let mut values = Vec::new();
        for condition in self.conditions() {
            if condition.field != PRIMARY_KEY_FIELD || condition.sub_field.is_some() {
                continue;
            }
            match (&condition.operator, &condition.value) {
                (FilterOperator::Eq, value) => values.push(identifier_text(value)),
                (FilterOperator::In, JsonValue::Array(items)) => {
                    values.extend(items.iter().map(identifier_text));
                }
                _ => {}
            }
        }
        values
    }
}

fn identifier_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expect_object(value: &JsonValue) -> Result<&JsonMap<String, JsonValue>, FilterError> {
    value.as_object().ok_or_else(|| FilterError::Malformed {
        reason: format!("expected an object, got {}", json_kind(value)),
    })
}

fn parse_nested(value: &JsonValue) -> Result<FilterExpr, FilterError> {
    parse_object(expect_object(value)?)
}

fn parse_object(object: &JsonMap<String, JsonValue>) -> Result<FilterExpr, FilterError> {
    if object.is_empty() {
        return Err(FilterError::Malformed {
            reason: "empty filter object".to_string(),
        });
    }

    let mut nodes = Vec::with_capacity(object.len());
    for (key, node) in object {
        match key.as_str() {
            "and" => nodes.push(FilterExpr::And(parse_list(key, node)?)),
            "or" => nodes.push(FilterExpr::Or(parse_list(key, node)?)),
            "not" => nodes.push(FilterExpr::Not(Box::new(parse_nested(node)?))),
            field => nodes.extend(parse_field(field, node)?),
        }
    }

    if nodes.len() == 1 {
        Ok(nodes.remove(0))
    } else {
        Ok(FilterExpr::And(nodes))
    }
}

fn parse_list(key: &str, node: &JsonValue) -> Result<Vec<FilterExpr>, FilterError> {
    let items = node.as_array().ok_or_else(|| FilterError::Malformed {
        reason: format!("'{}' expects an array of filters", key),
    })?;
    if items.is_empty() {
        return Err(FilterError::Malformed {
            reason: format!("'{}' has no filters", key),
        });
    }
    items.iter().map(parse_nested).collect()
}

fn parse_field(field: &str, node: &JsonValue) -> Result<Vec<FilterExpr>, FilterError> {
    let operators = node.as_object().ok_or_else(|| FilterError::Malformed {
        reason: format!("field '{}' expects an operator object", field),
    })?;
    if operators.is_empty() {
        return Err(FilterError::Malformed {
            reason: format!("field '{}' has no operator", field),
        });
    }

    let mut conditions = Vec::with_capacity(operators.len());
    for (key, value) in operators {
        match value {
            // `{ amount: { amountMicros: { gt: 5 } } }`
            JsonValue::Object(sub_ops) if !FilterOperator::is_known(key) => {
                if sub_ops.is_empty() {
                    return Err(FilterError::Malformed {
                        reason: format!("sub-field '{}' of '{}' has no operator", key, field),
                    });
                }
                for (op, sub_value) in sub_ops {
                    conditions.push(FilterExpr::Condition(FilterCondition {
                        field: field.to_string(),
                        sub_field: Some(key.clone()),
                        operator: FilterOperator::parse(op),
                        value: sub_value.clone(),
                    }));
                }
            }
            _ => conditions.push(FilterExpr::Condition(FilterCondition {
                field: field.to_string(),
                sub_field: None,
                operator: FilterOperator::parse(key),
                value: value.clone(),
            })),
        }
    }
    Ok(conditions)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_single_condition() {
        let filter = FilterExpr::from_json(&json!({"status": {"eq": "OPEN"}})).unwrap();
        assert_eq!(filter, FilterExpr::eq("status", json!("OPEN")));
    }

    #[test]
    fn test_parse_multiple_keys_conjoined() {
        let filter =
            FilterExpr::from_json(&json!({"status": {"eq": "OPEN"}, "name": {"like": "A%"}}))
                .unwrap();
        match filter {
            FilterExpr::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_logical_nodes() {
        let filter = FilterExpr::from_json(&json!({
            "or": [
                {"status": {"eq": "OPEN"}},
                {"not": {"name": {"is": "NULL"}}}
            ]
        }))
        .unwrap();
        assert_eq!(filter.depth(), 3);
        assert_eq!(filter.conditions().len(), 2);
    }

    #[test]
    fn test_parse_sub_field_condition() {
        let filter =
            FilterExpr::from_json(&json!({"amount": {"amountMicros": {"gt": 1000}}})).unwrap();
        let conditions = filter.conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].field, "amount");
        assert_eq!(conditions[0].sub_field.as_deref(), Some("amountMicros"));
        assert_eq!(conditions[0].operator, FilterOperator::Gt);
    }

    #[test]
    fn test_unknown_operator_kept_as_unsupported() {
        let filter = FilterExpr::from_json(&json!({"name": {"regex": "^a"}})).unwrap();
        assert_eq!(
            filter.conditions()[0].operator,
            FilterOperator::Unsupported("regex".to_string())
        );
    }

    #[test]
    fn test_malformed_filters_rejected() {
        assert!(FilterExpr::from_json(&json!("id = 1")).is_err());
        assert!(FilterExpr::from_json(&json!({"and": {"a": {"eq": 1}}})).is_err());
        assert!(FilterExpr::from_json(&json!({"name": "acme"})).is_err());
        assert!(FilterExpr::from_json(&json!({"name": {}})).is_err());
    }

    #[test]
    fn test_empty_filters() {
        assert!(FilterExpr::from_json(&json!({})).unwrap().is_empty());
        assert!(FilterExpr::from_json(&json!({"and": []})).unwrap().is_empty());
        assert!(FilterExpr::from_json(&json!({"or": []})).unwrap().is_empty());
        assert!(!FilterExpr::ids(["a"]).is_empty());
    }

    #[test]
    fn test_nested_empty_filters_rejected() {
        let nested = [
            json!({"or": [{"name": {"eq": "Company 0"}}, {}]}),
            json!({"or": [{"id": {"in": []}}, {}]}),
            json!({"and": [{"name": {"eq": "a"}}, {"or": []}]}),
            json!({"not": {}}),
            json!({"name": {"eq": "a"}, "and": []}),
            json!({"annualRevenue": {"amountMicros": {}}}),
            json!({"or": [{"name": {"eq": "Company 0"}}, {"annualRevenue": {"amountMicros": {}}}]}),
        ];
        for filter in nested {
            match FilterExpr::from_json(&filter) {
                Err(FilterError::Malformed { .. }) => {}
                other => panic!("expected Malformed for {}, got {:?}", filter, other),
            }
        }
    }

    #[test]
    fn test_identifier_values() {
        let filter = FilterExpr::from_json(&json!({
            "id": {"in": ["a", 7]},
            "or": [{"id": {"eq": "b"}}, {"name": {"eq": "c"}}]
        }))
        .unwrap();
        let mut values = filter.identifier_values();
        values.sort();
        assert_eq!(values, vec!["7".to_string(), "a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_operator_round_trip_names() {
        for name in ["eq", "neq", "gt", "gte", "lt", "lte", "in", "is", "like", "ilike", "startsWith"] {
            assert_eq!(FilterOperator::parse(name).as_str(), name);
        }
    }

    // ========================================================================
    // Nested filters: depth and identifier collection
    // ========================================================================

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn wrap(inner: JsonValue, levels: &[u8]) -> JsonValue {
            levels.iter().fold(inner, |acc, level| match level % 3 {
                0 => json!({ "and": [acc] }),
                1 => json!({ "or": [acc, {"name": {"eq": "x"}}] }),
                _ => json!({ "not": acc }),
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Each logical wrapper adds exactly one level of depth.
            #[test]
            fn prop_depth_counts_logical_nesting(levels in prop::collection::vec(any::<u8>(), 0..20)) {
                let filter = FilterExpr::from_json(&wrap(json!({"status": {"eq": "OPEN"}}), &levels));
                prop_assert!(filter.is_ok());
                let filter = filter.unwrap_or_else(|_| FilterExpr::And(vec![]));
                prop_assert_eq!(filter.depth(), levels.len() + 1);
            }

            /// Identifier values are found at any nesting depth.
            #[test]
            fn prop_identifier_values_found_when_nested(
                ids in prop::collection::vec("[a-z0-9-]{1,36}", 1..6),
                levels in prop::collection::vec(any::<u8>(), 0..10),
            ) {
                let filter = FilterExpr::from_json(&wrap(json!({"id": {"in": ids.clone()}}), &levels));
                prop_assert!(filter.is_ok());
                let filter = filter.unwrap_or_else(|_| FilterExpr::And(vec![]));
                prop_assert_eq!(filter.identifier_values(), ids);
            }
        }
    }
}
