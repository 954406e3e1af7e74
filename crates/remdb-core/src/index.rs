//! Secondary-index posting lists.
//!
//! For each indexed `(schema, field, value)` triple a posting list of entity
//! ids lives at `index:<schema>:<tenant>:<field>:<canonical(value)>`. Posting
//! mutations are computed as [`WriteOp`]s so the caller can fold them into
//! the same atomic batch as the owning entity write.
//!
//! ## Canonical value encoding
//!
//! This encoding is on-disk format; changing it breaks WAL compatibility.
//!
//! - strings: lowercased
//! - booleans: `0` / `1`
//! - integers: 20 decimal digits of `value - i64::MIN` (an order-preserving
//!   bias so lexicographic order matches numeric order, leaving room for
//!   range postings later)

use serde_json::Value;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::keys;
use crate::kv::{Store, WriteOp};

/// Canonical index encoding for a scalar value. `None` for values that
/// cannot be indexed (floats, arrays, objects, null).
pub fn canonical(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => {
            let i = n.as_i64()?;
            Some(format!("{:020}", (i as i128) - (i64::MIN as i128)))
        }
        _ => None,
    }
}

/// Posting lists for one schema under one tenant.
pub struct SecondaryIndex<'a> {
    store: &'a Store,
    tenant: &'a str,
    schema: &'a str,
}

impl<'a> SecondaryIndex<'a> {
    pub fn new(store: &'a Store, tenant: &'a str, schema: &'a str) -> Self {
        Self {
            store,
            tenant,
            schema,
        }
    }

    fn key(&self, field: &str, value: &Value) -> Option<Vec<u8>> {
        canonical(value).map(|c| keys::index(self.schema, self.tenant, field, &c))
    }

    /// Posting list for one field/value; empty when absent.
    pub fn lookup(&self, field: &str, value: &Value) -> Result<Vec<Uuid>> {
        let Some(key) = self.key(field, value) else {
            return Ok(Vec::new());
        };
        match self.store.get(&key)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// `WriteOp` that adds `id` to the posting list for `(field, value)`.
    /// Returns `None` when the value is not indexable.
    pub fn add_op(&self, id: Uuid, field: &str, value: &Value) -> Result<Option<WriteOp>> {
        let Some(key) = self.key(field, value) else {
            return Ok(None);
        };
        let mut ids: Vec<Uuid> = match self.store.get(&key)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
        }
        Ok(Some(WriteOp::put(key, serde_json::to_vec(&ids)?)))
    }

    /// `WriteOp` that removes `id` from the posting list, dropping the list
    /// when it becomes empty. `None` when there is nothing to do.
    pub fn remove_op(&self, id: Uuid, field: &str, value: &Value) -> Result<Option<WriteOp>> {
        let Some(key) = self.key(field, value) else {
            return Ok(None);
        };
        let Some(bytes) = self.store.get(&key)? else {
            return Ok(None);
        };
        let mut ids: Vec<Uuid> = serde_json::from_slice(&bytes)?;
        let Ok(pos) = ids.binary_search(&id) else {
            return Ok(None);
        };
        ids.remove(pos);
        if ids.is_empty() {
            Ok(Some(WriteOp::delete(key)))
        } else {
            Ok(Some(WriteOp::put(key, serde_json::to_vec(&ids)?)))
        }
    }

    /// Intersection of several lookups, cheapest-first.
    pub fn intersect(&self, lookups: &[(&str, &Value)]) -> Result<Vec<Uuid>> {
        let mut lists = Vec::with_capacity(lookups.len());
        for (field, value) in lookups {
            lists.push(self.lookup(field, value)?);
        }
        lists.sort_by_key(Vec::len);
        let mut iter = lists.into_iter();
        let Some(mut acc) = iter.next() else {
            return Ok(Vec::new());
        };
        for list in iter {
            acc.retain(|id| list.binary_search(id).is_ok());
            if acc.is_empty() {
                break;
            }
        }
        Ok(acc)
    }

    /// Union of several lookups, deduplicated.
    pub fn union(&self, lookups: &[(&str, &Value)]) -> Result<Vec<Uuid>> {
        let mut out: Vec<Uuid> = Vec::new();
        for (field, value) in lookups {
            out.extend(self.lookup(field, value)?);
        }
        out.sort();
        out.dedup();
        Ok(out)
    }
}

/// Index maintenance for an entity transition `old -> new`: removals for
/// stale values, adds for current ones. Either side may be absent
/// (insert / delete).
pub fn transition_ops(
    index: &SecondaryIndex<'_>,
    indexed_fields: &[String],
    id: Uuid,
    old: Option<&serde_json::Map<String, Value>>,
    new: Option<&serde_json::Map<String, Value>>,
) -> Result<Vec<WriteOp>> {
    let mut ops = Vec::new();
    for field in indexed_fields {
        let old_value = old.and_then(|m| m.get(field.as_str()));
        let new_value = new.and_then(|m| m.get(field.as_str()));
        if old_value == new_value {
            continue;
        }
        if let Some(value) = old_value {
            if let Some(op) = index.remove_op(id, field, value)? {
                ops.push(op);
            }
        }
        if let Some(value) = new_value {
            if let Some(op) = index.add_op(id, field, value)? {
                ops.push(op);
            }
        }
    }
    Ok(ops)
}

/// Reject non-scalar runtime values for indexed fields early, so posting
/// lists never silently skip a row.
pub fn check_indexable(field: &str, value: &Value) -> Result<()> {
    if value.is_null() || canonical(value).is_some() {
        Ok(())
    } else {
        Err(DbError::validation(
            field,
            "indexed fields must hold string, integer or boolean values",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn canonical_strings_fold_case() {
        assert_eq!(canonical(&json!("Engineer")).unwrap(), "engineer");
    }

    #[test]
    fn canonical_integers_preserve_order() {
        let values = [-5i64, -1, 0, 3, 1000];
        let encoded: Vec<String> = values
            .iter()
            .map(|v| canonical(&json!(v)).unwrap())
            .collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn canonical_rejects_non_scalars() {
        assert!(canonical(&json!([1, 2])).is_none());
        assert!(canonical(&json!({"a": 1})).is_none());
        assert!(canonical(&json!(1.5)).is_none());
    }

    #[test]
    fn add_lookup_remove_cycle() {
        let (_dir, store) = setup();
        let index = SecondaryIndex::new(&store, "t1", "person");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let role = json!("Engineer");

        for id in [a, b] {
            let op = index.add_op(id, "role", &role).unwrap().unwrap();
            store.batch(vec![op]).unwrap();
        }

        // Lookup is case-insensitive through canonicalization.
        let mut ids = index.lookup("role", &json!("engineer")).unwrap();
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);

        let op = index.remove_op(a, "role", &role).unwrap().unwrap();
        store.batch(vec![op]).unwrap();
        assert_eq!(index.lookup("role", &role).unwrap(), vec![b]);

        // Removing the last id drops the posting list entirely.
        let op = index.remove_op(b, "role", &role).unwrap().unwrap();
        store.batch(vec![op]).unwrap();
        let key = keys::index("person", "t1", "role", "engineer");
        assert_eq!(store.get(&key).unwrap(), None);
    }

    #[test]
    fn intersect_and_union() {
        let (_dir, store) = setup();
        let index = SecondaryIndex::new(&store, "t1", "person");
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        for (i, id) in ids.iter().enumerate() {
            let role = if i < 3 { json!("engineer") } else { json!("pm") };
            let team = if i % 2 == 0 { json!("platform") } else { json!("apps") };
            let mut ops = Vec::new();
            ops.extend(index.add_op(*id, "role", &role).unwrap());
            ops.extend(index.add_op(*id, "team", &team).unwrap());
            store.batch(ops).unwrap();
        }

        let engineer = json!("engineer");
        let platform = json!("platform");
        let both = index
            .intersect(&[("role", &engineer), ("team", &platform)])
            .unwrap();
        // Engineers 0 and 2 are on platform.
        assert_eq!(both.len(), 2);

        let pm = json!("pm");
        let either = index.union(&[("role", &engineer), ("role", &pm)]).unwrap();
        assert_eq!(either.len(), 4);
    }

    #[test]
    fn transition_only_touches_changed_fields() {
        let (_dir, store) = setup();
        let index = SecondaryIndex::new(&store, "t1", "person");
        let id = Uuid::new_v4();
        let fields = vec!["role".to_string(), "team".to_string()];

        let old = json!({"role": "engineer", "team": "platform"});
        let new = json!({"role": "manager", "team": "platform"});
        let ops = transition_ops(
            &index,
            &fields,
            id,
            old.as_object(),
            new.as_object(),
        )
        .unwrap();
        // role add only (nothing to remove yet, team unchanged).
        assert_eq!(ops.len(), 1);
    }
}
