//! Schema registry and structural validation.
//!
//! Schemas are JSON-Schema-shaped: `properties`, `required`, nested `$defs`,
//! plus engine metadata (`key_field`, `indexed_fields`, `category`, opaque
//! `tools`). Validation is structural (declared types, required fields,
//! enum membership, string length/pattern, numeric bounds) and recurses
//! through `$ref` into `$defs`.
//!
//! The in-memory cache is copy-on-write: registration rebuilds the map and
//! swaps an `Arc` under a short write lock, so readers never block on a
//! registration in flight.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{DbError, Result};

/// The `embedding` property is system-managed; payloads may not set it
/// directly (vectors go through `set_embedding`).
pub const RESERVED_EMBEDDING_FIELD: &str = "embedding";

/// Policy for properties the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraFields {
    /// Reject unknown properties (the default).
    #[default]
    Forbid,
    /// Accept and store unknown properties unvalidated.
    Allow,
}

/// A registered schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Verbatim description; the engine never rewrites it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Field name → JSON-schema fragment.
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    /// Attribute whose value determines the deterministic row id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,
    /// Fields with secondary-index posting lists.
    #[serde(default)]
    pub indexed_fields: Vec<String>,
    /// Opaque to the engine; passed through to collaborators.
    #[serde(default)]
    pub tools: Vec<Value>,
    /// Nested definitions referenced via `$ref: "#/$defs/<Name>"`.
    #[serde(default, rename = "$defs", skip_serializing_if = "Option::is_none")]
    pub defs: Option<Map<String, Value>>,
    #[serde(default)]
    pub extra: ExtraFields,
}

fn default_category() -> String {
    "user".to_string()
}

impl Schema {
    /// Parse a schema definition from its JSON form and run the
    /// registration-time checks.
    pub fn from_value(name: &str, definition: Value) -> Result<Self> {
        let mut value = definition;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("name".into(), Value::String(name.to_string()));
        } else {
            return Err(DbError::InvalidSchema {
                name: name.to_string(),
                reason: "schema definition must be a JSON object".into(),
            });
        }
        let schema: Schema =
            serde_json::from_value(value).map_err(|e| DbError::InvalidSchema {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        schema.check_definition()?;
        Ok(schema)
    }

    /// Registration-time invariants: indexed fields must be declared and of
    /// a hashable scalar type; the key field must be declared.
    fn check_definition(&self) -> Result<()> {
        for field in &self.indexed_fields {
            let declared = self.properties.get(field).ok_or_else(|| {
                DbError::InvalidSchema {
                    name: self.name.clone(),
                    reason: format!("indexed field '{field}' is not declared"),
                }
            })?;
            match declared_type(declared) {
                Some("string") | Some("integer") | Some("boolean") => {}
                other => {
                    return Err(DbError::InvalidSchema {
                        name: self.name.clone(),
                        reason: format!(
                            "indexed field '{field}' must be string, integer or boolean \
                             (got {})",
                            other.unwrap_or("untyped")
                        ),
                    })
                }
            }
        }
        if let Some(key_field) = &self.key_field {
            if !self.properties.contains_key(key_field.as_str()) {
                return Err(DbError::InvalidSchema {
                    name: self.name.clone(),
                    reason: format!("key field '{key_field}' is not declared"),
                });
            }
        }
        for field in &self.required {
            if !self.properties.contains_key(field.as_str()) {
                return Err(DbError::InvalidSchema {
                    name: self.name.clone(),
                    reason: format!("required field '{field}' is not declared"),
                });
            }
        }
        Ok(())
    }

    /// Validate a payload, returning the validated copy (with declared
    /// defaults filled in). Total: no entity row is written unless this
    /// accepts the payload.
    pub fn validate(&self, data: &Map<String, Value>) -> Result<Map<String, Value>> {
        if data.contains_key(RESERVED_EMBEDDING_FIELD) {
            return Err(DbError::validation(
                RESERVED_EMBEDDING_FIELD,
                "reserved field; use set_embedding instead",
            ));
        }

        let mut validated = Map::new();

        for (field, value) in data {
            match self.properties.get(field) {
                Some(field_schema) => {
                    self.validate_value(field, value, field_schema)?;
                    validated.insert(field.clone(), value.clone());
                }
                None if field == "edges" || field == "aliases" => {
                    // System fields accepted inline: the entity store
                    // materializes edges and lifts aliases.
                    validated.insert(field.clone(), value.clone());
                }
                None if self.extra == ExtraFields::Allow => {
                    validated.insert(field.clone(), value.clone());
                }
                None => {
                    return Err(DbError::validation(
                        field,
                        format!("unknown property on schema '{}'", self.name),
                    ))
                }
            }
        }

        for field in &self.required {
            if !validated.contains_key(field.as_str()) {
                if let Some(default) =
                    self.properties.get(field.as_str()).and_then(|s| s.get("default"))
                {
                    validated.insert(field.clone(), default.clone());
                } else {
                    return Err(DbError::validation(field, "missing required field"));
                }
            }
        }

        Ok(validated)
    }

    fn validate_value(&self, path: &str, value: &Value, field_schema: &Value) -> Result<()> {
        // Resolve $ref into $defs first.
        if let Some(reference) = field_schema.get("$ref").and_then(Value::as_str) {
            let def = self.resolve_ref(path, reference)?;
            return self.validate_value(path, value, &def);
        }

        // Null is accepted wherever the field is not required at this level.
        if value.is_null() {
            return Ok(());
        }

        if let Some(allowed) = field_schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(DbError::validation(
                    path,
                    format!("value {value} is not one of the allowed values"),
                ));
            }
        }

        match declared_type(field_schema) {
            Some("string") => {
                let s = value.as_str().ok_or_else(|| {
                    DbError::validation(path, format!("expected string, got {}", kind_of(value)))
                })?;
                self.validate_string(path, s, field_schema)?;
            }
            Some("integer") => {
                if !value.is_i64() && !value.is_u64() {
                    return Err(DbError::validation(
                        path,
                        format!("expected integer, got {}", kind_of(value)),
                    ));
                }
                self.validate_number(path, value.as_f64().unwrap_or_default(), field_schema)?;
            }
            Some("number") => {
                let n = value.as_f64().ok_or_else(|| {
                    DbError::validation(path, format!("expected number, got {}", kind_of(value)))
                })?;
                self.validate_number(path, n, field_schema)?;
            }
            Some("boolean") => {
                if !value.is_boolean() {
                    return Err(DbError::validation(
                        path,
                        format!("expected boolean, got {}", kind_of(value)),
                    ));
                }
            }
            Some("array") => {
                let items = value.as_array().ok_or_else(|| {
                    DbError::validation(path, format!("expected array, got {}", kind_of(value)))
                })?;
                if let Some(item_schema) = field_schema.get("items") {
                    for (i, item) in items.iter().enumerate() {
                        self.validate_value(&format!("{path}[{i}]"), item, item_schema)?;
                    }
                }
            }
            Some("object") => {
                let obj = value.as_object().ok_or_else(|| {
                    DbError::validation(path, format!("expected object, got {}", kind_of(value)))
                })?;
                self.validate_object(path, obj, field_schema)?;
            }
            Some(other) => {
                return Err(DbError::validation(
                    path,
                    format!("unsupported declared type '{other}'"),
                ))
            }
            // Untyped fields accept anything (beyond an enum check above).
            None => {}
        }
        Ok(())
    }

    fn validate_object(
        &self,
        path: &str,
        obj: &Map<String, Value>,
        object_schema: &Value,
    ) -> Result<()> {
        let nested_props = object_schema
            .get("properties")
            .and_then(Value::as_object);
        let nested_required: Vec<&str> = object_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if let Some(props) = nested_props {
            for (field, value) in obj {
                if let Some(field_schema) = props.get(field) {
                    self.validate_value(&format!("{path}.{field}"), value, field_schema)?;
                }
                // Undeclared nested members pass through; nested objects are
                // open unless a declared member fails.
            }
            for field in nested_required {
                if !obj.contains_key(field) {
                    return Err(DbError::validation(
                        format!("{path}.{field}"),
                        "missing required field",
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_string(&self, path: &str, s: &str, field_schema: &Value) -> Result<()> {
        let min = get_usize(field_schema, &["minLength", "min_length"]);
        let max = get_usize(field_schema, &["maxLength", "max_length"]);
        if let Some(min) = min {
            if s.chars().count() < min {
                return Err(DbError::validation(
                    path,
                    format!("shorter than minimum length {min}"),
                ));
            }
        }
        if let Some(max) = max {
            if s.chars().count() > max {
                return Err(DbError::validation(
                    path,
                    format!("longer than maximum length {max}"),
                ));
            }
        }
        if let Some(pattern) = field_schema.get("pattern").and_then(Value::as_str) {
            let re = regex::Regex::new(pattern).map_err(|e| {
                DbError::validation(path, format!("schema pattern is invalid: {e}"))
            })?;
            if !re.is_match(s) {
                return Err(DbError::validation(
                    path,
                    format!("does not match pattern '{pattern}'"),
                ));
            }
        }
        Ok(())
    }

    fn validate_number(&self, path: &str, n: f64, field_schema: &Value) -> Result<()> {
        let ge = get_f64(field_schema, &["minimum", "ge"]);
        let le = get_f64(field_schema, &["maximum", "le"]);
        if let Some(ge) = ge {
            if n < ge {
                return Err(DbError::validation(path, format!("below minimum {ge}")));
            }
        }
        if let Some(le) = le {
            if n > le {
                return Err(DbError::validation(path, format!("above maximum {le}")));
            }
        }
        Ok(())
    }

    fn resolve_ref(&self, path: &str, reference: &str) -> Result<Value> {
        let def_name = reference.strip_prefix("#/$defs/").ok_or_else(|| {
            DbError::validation(path, format!("unsupported $ref '{reference}'"))
        })?;
        self.defs
            .as_ref()
            .and_then(|defs| defs.get(def_name))
            .cloned()
            .ok_or_else(|| {
                DbError::validation(path, format!("$ref to undeclared def '{def_name}'"))
            })
    }
}

fn declared_type(field_schema: &Value) -> Option<&str> {
    field_schema.get("type").and_then(Value::as_str)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn get_usize(schema: &Value, names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|n| schema.get(*n).and_then(Value::as_u64))
        .map(|v| v as usize)
}

fn get_f64(schema: &Value, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|n| schema.get(*n).and_then(Value::as_f64))
}

/// Copy-on-write registry of schemas for one tenant.
pub struct SchemaRegistry {
    cache: RwLock<Arc<HashMap<String, Arc<Schema>>>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.cache.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_by_category(&self, category: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .read()
            .values()
            .filter(|s| s.category == category)
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn categories(&self) -> Vec<String> {
        let mut cats: Vec<String> = self
            .cache
            .read()
            .values()
            .map(|s| s.category.clone())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }

    /// Duplicate check: a re-registration with an identical definition is
    /// idempotent (returns the cached schema); a different definition for
    /// a taken name is an error.
    pub fn check_compatible(&self, schema: &Schema) -> Result<Option<Arc<Schema>>> {
        if let Some(existing) = self.get(&schema.name) {
            if existing.as_ref() == schema {
                return Ok(Some(existing));
            }
            return Err(DbError::DuplicateSchema(schema.name.clone()));
        }
        Ok(None)
    }

    /// Install a schema into the cache (rebuild + pointer swap).
    pub fn install(&self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        let mut guard = self.cache.write();
        let mut next: HashMap<String, Arc<Schema>> = guard.as_ref().clone();
        next.insert(schema.name.clone(), schema.clone());
        *guard = Arc::new(next);
        schema
    }
}

/// Built-in schemas registered automatically at open.
pub static BUILTIN_SCHEMAS: Lazy<Vec<(&'static str, Value)>> = Lazy::new(|| {
    vec![
        (
            "entity",
            json!({
                "title": "Entity",
                "description": "Domain knowledge node with open-ended properties.",
                "category": "system",
                "version": "1.0.0",
                "properties": {
                    "name": {"type": "string", "description": "Entity name"},
                    "category": {"type": "string", "description": "Entity category"},
                    "content": {"type": "string", "description": "Free-form content"},
                    "metadata": {"type": "object", "description": "Arbitrary metadata"}
                },
                "required": ["name"],
                "indexed_fields": ["category"],
                "extra": "allow"
            }),
        ),
        (
            "resource",
            json!({
                "title": "Resource",
                "description": "Chunked, embedded content from documents.",
                "category": "system",
                "version": "1.0.0",
                "properties": {
                    "name": {"type": "string", "description": "Resource name or title"},
                    "content": {"type": "string", "description": "Full text content"},
                    "category": {"type": "string", "description": "Resource category"},
                    "uri": {"type": "string", "description": "Source URI or reference"},
                    "ordinal": {"type": "integer", "description": "Chunk ordinal within the source"},
                    "metadata": {"type": "object", "description": "Arbitrary metadata"}
                },
                "required": ["name", "content"],
                "key_field": "uri",
                "indexed_fields": ["category", "name"],
                "extra": "allow"
            }),
        ),
        (
            "session",
            json!({
                "title": "Session",
                "description": "Conversation session grouping related messages.",
                "category": "system",
                "version": "1.0.0",
                "properties": {
                    "name": {"type": "string", "description": "Session name"},
                    "query": {"type": "string", "description": "Initial query or prompt"},
                    "agent": {"type": "string", "description": "Agent name used in this session"},
                    "session_type": {"type": "string", "description": "Session type (chat, task, eval)"},
                    "case_id": {"type": "string", "description": "Related case or project id"},
                    "metadata": {"type": "object", "description": "Session metadata"}
                },
                "required": ["query"],
                "indexed_fields": ["agent", "session_type"]
            }),
        ),
        (
            "message",
            json!({
                "title": "Message",
                "description": "Individual message within a session.",
                "category": "system",
                "version": "1.0.0",
                "properties": {
                    "session_id": {"type": "string", "description": "Parent session id"},
                    "role": {
                        "type": "string",
                        "description": "Message role",
                        "enum": ["user", "assistant", "system", "tool"]
                    },
                    "content": {"type": "string", "description": "Message content"},
                    "trace_id": {"type": "string", "description": "Trace id for observability"},
                    "span_id": {"type": "string", "description": "Span id"},
                    "metadata": {"type": "object", "description": "Message metadata"}
                },
                "required": ["session_id", "role", "content"],
                "indexed_fields": ["session_id", "role"]
            }),
        ),
        (
            "feedback",
            json!({
                "title": "Feedback",
                "description": "User feedback attached to a session.",
                "category": "system",
                "version": "1.0.0",
                "properties": {
                    "session_id": {"type": "string", "description": "Session the feedback refers to"},
                    "rating": {"type": "integer", "description": "1-5 rating", "minimum": 1, "maximum": 5},
                    "comment": {"type": "string", "description": "Free-form comment"},
                    "category": {"type": "string", "description": "Feedback category"}
                },
                "required": ["session_id", "rating"],
                "indexed_fields": ["session_id", "category"]
            }),
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn person_schema() -> Schema {
        Schema::from_value(
            "person",
            json!({
                "description": "A person in the organization.",
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "email": {"type": "string", "pattern": "^[^@]+@[^@]+$"},
                    "role": {"type": "string"},
                    "team": {"type": "string"},
                    "level": {"type": "integer", "minimum": 1, "maximum": 10},
                    "address": {"$ref": "#/$defs/Address"}
                },
                "required": ["name", "email"],
                "indexed_fields": ["role", "team"],
                "$defs": {
                    "Address": {
                        "type": "object",
                        "properties": {
                            "city": {"type": "string"},
                            "zip": {"type": "string", "pattern": "^[0-9]{4,5}$"}
                        },
                        "required": ["city"]
                    }
                }
            }),
        )
        .unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_valid_payload() {
        let schema = person_schema();
        let data = obj(json!({
            "name": "Alice",
            "email": "alice@example.com",
            "role": "engineer",
            "level": 3,
            "address": {"city": "Oslo", "zip": "0150"}
        }));
        let validated = schema.validate(&data).unwrap();
        assert_eq!(validated, data);
    }

    #[test]
    fn rejects_missing_required() {
        let schema = person_schema();
        let err = schema.validate(&obj(json!({"name": "Bob"}))).unwrap_err();
        assert!(matches!(err, DbError::Validation { ref field, .. } if field == "email"));
    }

    #[test]
    fn rejects_wrong_type_and_bounds() {
        let schema = person_schema();
        let err = schema
            .validate(&obj(json!({"name": "A", "email": "a@b", "level": "three"})))
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { ref field, .. } if field == "level"));

        let err = schema
            .validate(&obj(json!({"name": "A", "email": "a@b", "level": 11})))
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { ref field, .. } if field == "level"));
    }

    #[test]
    fn rejects_pattern_mismatch_in_nested_def() {
        let schema = person_schema();
        let err = schema
            .validate(&obj(json!({
                "name": "A",
                "email": "a@b",
                "address": {"city": "Oslo", "zip": "abc"}
            })))
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { ref field, .. } if field == "address.zip"));
    }

    #[test]
    fn rejects_unknown_property_unless_extra_allow() {
        let schema = person_schema();
        let err = schema
            .validate(&obj(json!({"name": "A", "email": "a@b", "salary": 1})))
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { ref field, .. } if field == "salary"));

        let open = Schema::from_value(
            "open",
            json!({
                "properties": {"name": {"type": "string"}},
                "extra": "allow"
            }),
        )
        .unwrap();
        open.validate(&obj(json!({"name": "x", "anything": [1, 2]})))
            .unwrap();
    }

    #[test]
    fn rejects_reserved_embedding_field() {
        let schema = person_schema();
        let err = schema
            .validate(&obj(json!({"name": "A", "email": "a@b", "embedding": [0.1]})))
            .unwrap_err();
        assert!(
            matches!(err, DbError::Validation { ref field, .. } if field == RESERVED_EMBEDDING_FIELD)
        );
    }

    #[test]
    fn enum_membership_is_enforced() {
        let schema = Schema::from_value(
            "ticket",
            json!({
                "properties": {
                    "status": {"type": "string", "enum": ["open", "closed"]}
                }
            }),
        )
        .unwrap();
        schema.validate(&obj(json!({"status": "open"}))).unwrap();
        let err = schema.validate(&obj(json!({"status": "weird"}))).unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
    }

    #[test]
    fn indexed_field_must_be_scalar() {
        let err = Schema::from_value(
            "bad",
            json!({
                "properties": {"tags": {"type": "array"}},
                "indexed_fields": ["tags"]
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::InvalidSchema { .. }));
    }

    #[test]
    fn registry_is_idempotent_on_identical_definition() {
        let registry = SchemaRegistry::new();
        let schema = person_schema();
        registry.install(schema.clone());
        assert!(registry.check_compatible(&schema).unwrap().is_some());

        let mut changed = schema;
        changed.required.push("role".into());
        assert!(matches!(
            registry.check_compatible(&changed),
            Err(DbError::DuplicateSchema(_))
        ));
    }

    #[test]
    fn builtins_parse_and_register() {
        let registry = SchemaRegistry::new();
        for (name, definition) in BUILTIN_SCHEMAS.iter() {
            let schema = Schema::from_value(name, definition.clone()).unwrap();
            registry.install(schema);
        }
        assert_eq!(
            registry.list(),
            vec!["entity", "feedback", "message", "resource", "session"]
        );
        assert_eq!(registry.list_by_category("system").len(), 5);
        assert_eq!(registry.get("resource").unwrap().key_field.as_deref(), Some("uri"));
    }
}
