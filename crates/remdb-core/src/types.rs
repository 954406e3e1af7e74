//! Record types stored in the KV layer.
//!
//! Every durable row (entity, edge, moment) serializes to canonical JSON;
//! WAL entries serialize to MessagePack because they carry raw key/value
//! bytes that replication must preserve verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The universal record type. `properties` holds the schema-validated
/// payload; everything else is system-managed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: Uuid,
    /// Name of the schema this record belongs to.
    pub schema: String,
    /// Display string; defaults to `<schema>_<id>` when the payload has none.
    pub name: String,
    /// Alternative identifier strings (employee codes, ticket ids, brands).
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Schema-validated payload. Nested objects permitted.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Dense vector of the index dimension, if one has been set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Entity {
    /// Extract a value by dotted path: `properties.*` first, then the
    /// system fields. Returns `None` for missing paths.
    pub fn field(&self, path: &str) -> Option<Value> {
        if let Some(v) = lookup_path(&self.properties, path) {
            return Some(v);
        }
        match path {
            "id" => Some(Value::String(self.id.to_string())),
            "schema" => Some(Value::String(self.schema.clone())),
            "name" => Some(Value::String(self.name.clone())),
            "aliases" => Some(Value::Array(
                self.aliases.iter().cloned().map(Value::String).collect(),
            )),
            "created_at" => Some(Value::String(self.created_at.to_rfc3339())),
            "modified_at" => Some(Value::String(self.modified_at.to_rfc3339())),
            _ => None,
        }
    }
}

/// Walk a dotted path (`a.b.c`) through nested JSON objects.
fn lookup_path(map: &Map<String, Value>, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = map.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

/// A directed, typed edge row. Keyed by `(src, dst, rel_type)`, so
/// re-creating the same edge overwrites in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEdge {
    pub src_id: Uuid,
    pub dst_id: Uuid,
    pub rel_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Temporal grouping of entities and resources at a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Moment {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    #[serde(default)]
    pub classifications: Vec<String>,
    #[serde(default)]
    pub resource_refs: Vec<Uuid>,
    #[serde(default)]
    pub entity_refs: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_moment: Option<Uuid>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Edge traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// Sort order for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

/// WAL operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOp {
    Put,
    Delete,
}

/// One durable write-ahead-log record. `key_bytes`/`value_bytes` are the
/// exact bytes written to the store; followers apply them unmodified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalEntry {
    pub seq: u64,
    pub tenant: String,
    pub tablespace: String,
    pub op: WalOp,
    pub key_bytes: Vec<u8>,
    pub value_bytes: Vec<u8>,
    pub timestamp_ns: u64,
    pub source_peer: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity_with(props: Value) -> Entity {
        Entity {
            id: Uuid::nil(),
            schema: "person".into(),
            name: "Alice".into(),
            aliases: vec!["AL-1".into()],
            properties: props.as_object().cloned().unwrap(),
            embedding: None,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn field_prefers_properties_over_system_fields() {
        let e = entity_with(json!({"name": "shadowed", "role": "engineer"}));
        assert_eq!(e.field("name"), Some(json!("shadowed")));
        assert_eq!(e.field("role"), Some(json!("engineer")));
        assert_eq!(e.field("schema"), Some(json!("person")));
    }

    #[test]
    fn field_walks_dotted_paths() {
        let e = entity_with(json!({"address": {"city": {"name": "Oslo"}}}));
        assert_eq!(e.field("address.city.name"), Some(json!("Oslo")));
        assert_eq!(e.field("address.city.zip"), None);
    }

    #[test]
    fn wal_entry_roundtrips_through_msgpack() {
        let entry = WalEntry {
            seq: 42,
            tenant: "t".into(),
            tablespace: "default".into(),
            op: WalOp::Put,
            key_bytes: b"entity:t:x".to_vec(),
            value_bytes: vec![0, 159, 146, 150],
            timestamp_ns: 1,
            source_peer: "leader-a".into(),
        };
        let bytes = rmp_serde::to_vec(&entry).unwrap();
        let back: WalEntry = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back, entry);
    }
}
