//! Connection envelopes for mutation results.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tessera_core::{Record, PRIMARY_KEY_FIELD};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEdge {
    pub node: Record,
    pub cursor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// Paginated envelope around records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordConnection {
    pub edges: Vec<RecordEdge>,
    pub page_info: PageInfo,
    pub total_count: usize,
}

impl RecordConnection {
    /// Single-record connection, as returned for each updated record.
    pub fn single(record: Record) -> Self {
        Self::page(vec![record], 1)
    }

    /// First page of a larger set of `total_count` records.
    pub fn page(records: Vec<Record>, total_count: usize) -> Self {
        let edges: Vec<RecordEdge> = records
            .into_iter()
            .map(|node| RecordEdge {
                cursor: encode_cursor(node.get(PRIMARY_KEY_FIELD).unwrap_or(&JsonValue::Null)),
                node,
            })
            .collect();
        Self {
            page_info: PageInfo {
                has_next_page: total_count > edges.len(),
                has_previous_page: false,
                start_cursor: edges.first().map(|edge| edge.cursor.clone()),
                end_cursor: edges.last().map(|edge| edge.cursor.clone()),
            },
            edges,
            total_count,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Record> {
        self.edges.iter().map(|edge| &edge.node)
    }
}

/// Wrap each record in its own single-item connection, keeping order.
pub fn shape_connections(records: Vec<Record>) -> Vec<RecordConnection> {
    records.into_iter().map(RecordConnection::single).collect()
}

/// Opaque cursor: base64 of `{"id": <id>}`.
pub fn encode_cursor(id: &JsonValue) -> String {
    STANDARD.encode(json!({ PRIMARY_KEY_FIELD: id }).to_string())
}

/// Recover the id from a cursor produced by `encode_cursor`.
pub fn decode_cursor(cursor: &str) -> Option<JsonValue> {
    let bytes = STANDARD.decode(cursor).ok()?;
    let value: JsonValue = serde_json::from_slice(&bytes).ok()?;
    value.get(PRIMARY_KEY_FIELD).cloned()
}
