//! Entity-row plumbing: deterministic ids, upsert merging, inline-edge
//! extraction, alias handling. The database facade composes these into
//! atomic batches; nothing here touches the store directly.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::types::{Entity, StoredEdge};

/// Property names recognized as external identifiers by global lookup.
pub const ID_LIKE_FIELDS: &[&str] = &[
    "id",
    "code",
    "ticket_id",
    "employee_id",
    "issue_number",
    "identifier",
];

/// Deterministic 128-bit id for key-field schemas: stable across processes
/// and re-inserts, so insert-with-same-key is an idempotent upsert.
pub fn deterministic_id(tenant: &str, schema: &str, key_value: &Value) -> Uuid {
    let key_text = match key_value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut hasher = Sha256::new();
    hasher.update(tenant.as_bytes());
    hasher.update([0]);
    hasher.update(schema.as_bytes());
    hasher.update([0]);
    hasher.update(key_text.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// An edge given inline on an insert payload.
#[derive(Debug, Clone)]
pub struct InlineEdge {
    pub dst_id: Uuid,
    pub rel_type: String,
    pub properties: Map<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl InlineEdge {
    pub fn materialize(self, src_id: Uuid, now: DateTime<Utc>) -> StoredEdge {
        StoredEdge {
            src_id,
            dst_id: self.dst_id,
            rel_type: self.rel_type,
            properties: self.properties,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

/// Pull the inline `edges` array out of a validated payload. Accepts
/// `dst`/`dst_id` interchangeably; entries are removed from the payload so
/// entity rows never carry derived edge state.
pub fn take_inline_edges(properties: &mut Map<String, Value>) -> Result<Vec<InlineEdge>> {
    let Some(raw) = properties.remove("edges") else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = raw else {
        return Err(DbError::validation("edges", "expected an array of edges"));
    };
    let mut edges = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let path = format!("edges[{i}]");
        let Value::Object(obj) = item else {
            return Err(DbError::validation(path, "expected an edge object"));
        };
        let dst = obj
            .get("dst_id")
            .or_else(|| obj.get("dst"))
            .and_then(Value::as_str)
            .ok_or_else(|| DbError::validation(&path, "missing dst id"))?;
        let dst_id = dst
            .parse::<Uuid>()
            .map_err(|_| DbError::validation(&path, "dst id is not a valid uuid"))?;
        let rel_type = obj
            .get("rel_type")
            .and_then(Value::as_str)
            .ok_or_else(|| DbError::validation(&path, "missing rel_type"))?
            .to_string();
        let properties = obj
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let created_at = obj
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        edges.push(InlineEdge {
            dst_id,
            rel_type,
            properties,
            created_at,
        });
    }
    Ok(edges)
}

/// Pull the `aliases` array out of a validated payload.
pub fn take_aliases(properties: &mut Map<String, Value>) -> Result<Vec<String>> {
    let Some(raw) = properties.remove("aliases") else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = raw else {
        return Err(DbError::validation("aliases", "expected an array of strings"));
    };
    let mut aliases = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => aliases.push(s),
            _ => return Err(DbError::validation("aliases", "expected an array of strings")),
        }
    }
    Ok(aliases)
}

/// Build a fresh entity row.
pub fn build_new(
    id: Uuid,
    schema: &str,
    properties: Map<String, Value>,
    aliases: Vec<String>,
    now: DateTime<Utc>,
) -> Entity {
    let name = display_name(schema, id, &properties);
    Entity {
        id,
        schema: schema.to_string(),
        name,
        aliases,
        properties,
        embedding: None,
        created_at: now,
        modified_at: now,
    }
}

/// Upsert merge: incoming fields overwrite, absent fields survive, aliases
/// union, `created_at` is preserved, the embedding stays untouched.
pub fn merge_existing(
    mut existing: Entity,
    incoming: Map<String, Value>,
    new_aliases: Vec<String>,
    now: DateTime<Utc>,
) -> Entity {
    for (field, value) in incoming {
        existing.properties.insert(field, value);
    }
    for alias in new_aliases {
        if !existing.aliases.contains(&alias) {
            existing.aliases.push(alias);
        }
    }
    existing.name = display_name(&existing.schema, existing.id, &existing.properties);
    existing.modified_at = now;
    existing
}

fn display_name(schema: &str, id: Uuid, properties: &Map<String, Value>) -> String {
    properties
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{schema}_{id}"))
}
