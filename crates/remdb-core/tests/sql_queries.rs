//! SQL surface end-to-end: predicates, projection, pagination, similarity
//! and hybrid queries with a deterministic embedder.

mod common;

use common::{open_db, open_db_with_embedder, HashEmbedder, TEST_DIM};
use remdb_core::{DbError, Embedder};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn where_in_or_and_pagination() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");
    db.register_schema(
        "ticket",
        json!({
            "properties": {
                "name": {"type": "string"},
                "status": {"type": "string"},
                "priority": {"type": "integer"}
            },
            "indexed_fields": ["status"]
        }),
    )
    .unwrap();

    for i in 0..10 {
        let status = match i % 3 {
            0 => "open",
            1 => "blocked",
            _ => "closed",
        };
        db.insert(
            "ticket",
            json!({"name": format!("t{i}"), "status": status, "priority": i}),
        )
        .unwrap();
    }

    let rows = db
        .sql("SELECT name FROM ticket WHERE status IN ('open', 'blocked') ORDER BY name ASC")
        .unwrap();
    assert_eq!(rows.len(), 7);

    let rows = db
        .sql("SELECT name FROM ticket WHERE status = 'open' OR status = 'closed' ORDER BY name ASC")
        .unwrap();
    assert_eq!(rows.len(), 7);

    let page = db
        .sql("SELECT name FROM ticket ORDER BY name ASC LIMIT 3 OFFSET 8")
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["name"], json!("t8"));

    // i=7 is blocked, i=8 closed, i=9 open.
    let rows = db
        .sql("SELECT name FROM ticket WHERE priority >= 7 AND status != 'closed' ORDER BY priority DESC")
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("t9"));
    assert_eq!(rows[1]["name"], json!("t7"));
}

#[test]
fn projection_returns_null_for_missing_and_nested_paths() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    db.insert(
        "entity",
        json!({
            "name": "nested",
            "category": "demo",
            "details": {"owner": {"email": "x@y.z"}}
        }),
    )
    .unwrap();

    let rows = db
        .sql("SELECT name, details.owner.email, absent FROM entity")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["details.owner.email"], json!("x@y.z"));
    assert_eq!(rows[0]["absent"], serde_json::Value::Null);
}

#[test]
fn parse_errors_surface_with_position() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");

    let err = db.sql("SELEC * FROM entity").unwrap_err();
    assert!(matches!(err, DbError::Parse { .. }));

    let err = db.sql("SELECT * FROM missing_table").unwrap_err();
    assert!(matches!(err, DbError::UnknownSchema(_)));
}

#[test]
fn hybrid_query_filters_and_scores() {
    let dir = TempDir::new().unwrap();
    let db = open_db_with_embedder(&dir, "t1");

    // 20 resources; half tutorials about plants, half unrelated notes.
    for i in 0..20 {
        let (category, content) = if i % 2 == 0 {
            ("tutorial", format!("caring for indoor plants part {i}"))
        } else {
            ("note", format!("quarterly finance report {i}"))
        };
        let id = db
            .insert(
                "resource",
                json!({
                    "name": format!("r{i}"),
                    "content": content,
                    "category": category,
                    "uri": format!("doc://{i}")
                }),
            )
            .unwrap();
        // Attach vectors synchronously so the test does not depend on
        // worker timing.
        let vector = HashEmbedder::new(TEST_DIM).embed(&content).unwrap();
        db.set_embedding(id, vector).unwrap();
    }
    assert!(db.wait_for_worker(Duration::from_secs(10)));

    let rows = db
        .sql(
            "SELECT * FROM resource \
             WHERE embedding.cosine(\"indoor plants\") AND category = 'tutorial' \
             LIMIT 5",
        )
        .unwrap();

    assert!(!rows.is_empty() && rows.len() <= 5);
    let mut previous = f64::INFINITY;
    for row in &rows {
        assert_eq!(row["category"], json!("tutorial"));
        let score = row["_score"].as_f64().unwrap();
        assert!(score >= 0.0, "similarity score is non-negative here");
        assert!(score <= previous, "rows ordered by score descending");
        previous = score;
    }
}

#[test]
fn similarity_without_embedder_is_an_error() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");
    let err = db
        .sql("SELECT * FROM resource WHERE embedding.cosine('q')")
        .unwrap_err();
    assert!(matches!(err, DbError::Embedding(_)));
}

#[test]
fn similarity_on_unknown_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let db = open_db_with_embedder(&dir, "t1");
    let err = db
        .sql("SELECT * FROM resource WHERE title.cosine('q')")
        .unwrap_err();
    assert!(matches!(err, DbError::UnknownSimilarityField(_)));
}

#[test]
fn search_similar_respects_min_score_and_k() {
    let dir = TempDir::new().unwrap();
    let db = open_db_with_embedder(&dir, "t1");
    let embedder = HashEmbedder::new(TEST_DIM);

    let texts = [
        "rust borrow checker",
        "rust lifetimes and ownership",
        "gardening in small spaces",
    ];
    for (i, text) in texts.iter().enumerate() {
        let id = db
            .insert(
                "resource",
                json!({"name": format!("d{i}"), "content": text, "uri": format!("d://{i}")}),
            )
            .unwrap();
        db.set_embedding(id, embedder.embed(text).unwrap()).unwrap();
    }

    let query = embedder.embed("rust ownership").unwrap();
    let hits = db.search_similar(&query, 2, 0.0).unwrap();
    assert!(hits.len() <= 2 && !hits.is_empty());
    // Best hit shares more tokens with the query.
    assert_eq!(hits[0].0.properties["name"], json!("d1"));

    let none = db.search_similar(&query, 10, 0.999).unwrap();
    assert!(none.iter().all(|(_, s)| *s >= 0.999));
}

#[test]
fn direct_embedding_property_writes_are_rejected() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, "t1");
    let err = db
        .insert(
            "resource",
            json!({"name": "x", "content": "y", "uri": "u://1", "embedding": [0.0, 0.1]}),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
}
