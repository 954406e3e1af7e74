//! End-to-end tests for the database facade: deterministic upserts, index
//! usage, tenant isolation, lookup, and delete cascades.

mod common;

use common::open_db;
use remdb_core::{DbError, Direction};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

#[test]
fn deterministic_upsert_merges_edges() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    // The built-in resource schema declares key_field = uri.
    let u1 = Uuid::new_v4();
    let u2 = Uuid::new_v4();

    let first = db
        .insert(
            "resource",
            json!({
                "name": "A",
                "content": "original",
                "uri": "x://a",
                "edges": [{"dst": u1.to_string(), "rel_type": "references"}]
            }),
        )
        .unwrap();
    let second = db
        .insert(
            "resource",
            json!({
                "name": "A2",
                "content": "updated",
                "uri": "x://a",
                "edges": [
                    {"dst": u2.to_string(), "rel_type": "cites"},
                    // Duplicate of the first edge; collapses by (dst, rel).
                    {"dst": u1.to_string(), "rel_type": "references"}
                ]
            }),
        )
        .unwrap();

    assert_eq!(first, second, "same key field value yields the same id");

    let row = db.get(first).unwrap().expect("row exists");
    assert_eq!(row.name, "A2");
    assert_eq!(row.properties["content"], json!("updated"));

    let edges = db.get_edges(first, Direction::Outgoing).unwrap();
    assert_eq!(edges.len(), 2, "edges merged, duplicates collapsed");
    let mut rels: Vec<&str> = edges.iter().map(|e| e.rel_type.as_str()).collect();
    rels.sort();
    assert_eq!(rels, vec!["cites", "references"]);

    // Exactly one row of the schema exists.
    assert_eq!(db.entities("resource").unwrap().len(), 1);
}

#[test]
fn sql_uses_index_intersection_with_sort_and_limit() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    db.register_schema(
        "person",
        json!({
            "properties": {
                "name": {"type": "string"},
                "role": {"type": "string"},
                "team": {"type": "string"}
            },
            "required": ["name"],
            "indexed_fields": ["role", "team"]
        }),
    )
    .unwrap();

    let mut expected: Vec<String> = Vec::new();
    for i in 0..100 {
        let role = if i % 2 == 0 { "engineer" } else { "designer" };
        let team = if i % 4 == 0 { "platform" } else { "apps" };
        let name = format!("p{i:03}");
        if role == "engineer" && team == "platform" {
            expected.push(name.clone());
        }
        db.insert(
            "person",
            json!({"name": name, "role": role, "team": team}),
        )
        .unwrap();
    }
    expected.sort();

    let before = db.exec_stats();
    let rows = db
        .sql(
            "SELECT name FROM person \
             WHERE role = 'engineer' AND team = 'platform' \
             ORDER BY name ASC LIMIT 5",
        )
        .unwrap();
    let after = db.exec_stats();

    assert_eq!(rows.len(), 5);
    let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, expected[..5].iter().map(String::as_str).collect::<Vec<_>>());

    // The planner went through index intersection, not a scan.
    assert_eq!(after.index_intersections, before.index_intersections + 1);
    assert_eq!(after.full_scans, before.full_scans);
    assert!(after.index_lookups >= before.index_lookups + 2);
}

#[test]
fn tenants_are_isolated_on_one_path() {
    let dir = TempDir::new().unwrap();
    let db1 = open_db(&dir, "tenant1");
    let db2 = open_db(&dir, "tenant2");

    db1.insert("entity", json!({"name": "only-in-1", "category": "x"}))
        .unwrap();
    db2.insert("entity", json!({"name": "only-in-2", "category": "x"}))
        .unwrap();

    let rows1 = db1.entities("entity").unwrap();
    assert_eq!(rows1.len(), 1);
    assert_eq!(rows1[0].name, "only-in-1");

    // Index lookups are tenant-scoped too.
    let rows = db1
        .sql("SELECT name FROM entity WHERE category = 'x'")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("only-in-1"));

    // Lookup by name never crosses tenants.
    assert!(db1.lookup("only-in-2").unwrap().is_empty());
    assert_eq!(db2.lookup("only-in-2").unwrap().len(), 1);

    // Sequences advance independently per tenant.
    assert!(db1.current_seq() > 0);
    assert!(db2.current_seq() > 0);
}

#[test]
fn round_trip_preserves_declared_fields() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    let payload = json!({
        "session_id": Uuid::new_v4().to_string(),
        "role": "assistant",
        "content": "hello there",
        "metadata": {"tokens": 12}
    });
    let id = db.insert("message", payload.clone()).unwrap();
    let row = db.get(id).unwrap().unwrap();

    for (field, value) in payload.as_object().unwrap() {
        assert_eq!(row.properties.get(field), Some(value), "field {field}");
    }
    assert_eq!(row.schema, "message");
}

#[test]
fn unknown_schema_and_validation_failures_surface() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    let err = db.insert("nope", json!({"a": 1})).unwrap_err();
    assert!(matches!(err, DbError::UnknownSchema(_)));

    // Missing required field on a built-in schema.
    let err = db.insert("message", json!({"role": "user"})).unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));

    // Enum violation.
    let err = db
        .insert(
            "message",
            json!({"session_id": "s", "role": "intruder", "content": "x"}),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));

    // Nothing was written by the failed inserts.
    assert!(db.entities("message").unwrap().is_empty());
}

#[test]
fn lookup_by_alias_and_id_like_property() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    let id = db
        .insert(
            "entity",
            json!({
                "name": "Shipping Carrier",
                "aliases": ["DHL", "dhl-express"],
                "code": "CAR-77"
            }),
        )
        .unwrap();

    // Direct id string.
    assert_eq!(db.lookup(&id.to_string()).unwrap()[0].id, id);
    // Case-insensitive name.
    assert_eq!(db.lookup("shipping carrier").unwrap()[0].id, id);
    // Alias, any case.
    assert_eq!(db.lookup("dhl").unwrap()[0].id, id);
    // Recognized id-like property.
    assert_eq!(db.lookup("CAR-77").unwrap()[0].id, id);
    // No duplicates even when several rules match.
    assert_eq!(db.lookup("DHL").unwrap().len(), 1);
}

#[test]
fn delete_cascades_indexes_aliases_and_edges() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    let a = db
        .insert("entity", json!({"name": "a", "category": "node", "aliases": ["A-1"]}))
        .unwrap();
    let b = db.insert("entity", json!({"name": "b", "category": "node"})).unwrap();
    db.create_edge(a, b, "linked", Default::default()).unwrap();
    db.create_edge(b, a, "backlink", Default::default()).unwrap();

    db.delete(a).unwrap();

    assert!(db.get(a).unwrap().is_none());
    assert!(db.lookup("A-1").unwrap().is_empty());
    // Both directions of a's edges are gone.
    assert!(db.get_edges(b, Direction::Both).unwrap().is_empty());
    // The index no longer returns the deleted row.
    let rows = db
        .sql("SELECT name FROM entity WHERE category = 'node'")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("b"));

    // Deleting again is a no-op, not an error.
    db.delete(a).unwrap();
}

#[test]
fn duplicate_schema_registration_rules() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    let definition = json!({
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    });
    db.register_schema("thing", definition.clone()).unwrap();
    // Identical definition: idempotent.
    db.register_schema("thing", definition).unwrap();

    // Changed definition: rejected.
    let err = db
        .register_schema(
            "thing",
            json!({
                "properties": {"name": {"type": "integer"}},
                "required": ["name"]
            }),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateSchema(_)));
}

#[test]
fn schemas_and_rows_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let db = open_db(&dir, "t1");
        db.register_schema(
            "note",
            json!({"properties": {"name": {"type": "string"}, "body": {"type": "string"}}}),
        )
        .unwrap();
        db.insert("note", json!({"name": "n1", "body": "remember this"}))
            .unwrap()
    };

    let db = open_db(&dir, "t1");
    assert!(db.list_schemas().contains(&"note".to_string()));
    let row = db.get(id).unwrap().expect("row survived reopen");
    assert_eq!(row.properties["body"], json!("remember this"));
}
