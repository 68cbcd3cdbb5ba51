//! Query state shared by reads and writes.

use crate::predicate::Predicate;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Column-to-value assignments for a set-based update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageUpdatePayload {
    columns: BTreeMap<String, JsonValue>,
}

impl StorageUpdatePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: JsonValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, JsonValue)> for StorageUpdatePayload {
    fn from_iter<T: IntoIterator<Item = (String, JsonValue)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Target table plus accumulated `WHERE` conditions.
///
/// Cloning yields an independent state: conditions added to the clone never
/// reach the original.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    table: String,
    conditions: Vec<Predicate>,
}

impl QueryState {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add a condition, conjoined with any existing ones.
    pub fn and_where(&mut self, predicate: Predicate) -> &mut Self {
        self.conditions.push(predicate);
        self
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// The full condition as one predicate.
    pub fn predicate(&self) -> Predicate {
        match self.conditions.as_slice() {
            [single] => single.clone(),
            many => Predicate::And(many.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clone_does_not_share_conditions() {
        let base = QueryState::new("company");
        let mut read = base.clone();
        read.and_where(Predicate::eq("name", json!("Acme")));

        assert!(read.has_conditions());
        assert!(!base.has_conditions());
    }

    #[test]
    fn test_multiple_conditions_conjoined() {
        let mut query = QueryState::new("t");
        query
            .and_where(Predicate::eq("a", json!(1)))
            .and_where(Predicate::eq("b", json!(2)));
        assert!(matches!(query.predicate(), Predicate::And(ref c) if c.len() == 2));
    }
}
