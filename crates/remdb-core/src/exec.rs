//! Query planning and execution support.
//!
//! Planning decides between index-assisted fetch and a full prefix scan;
//! execution (driven by the database facade) funnels through the counters
//! here so tests can observe which path a query took.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};

use crate::predicate::Predicate;
use crate::types::Entity;

/// How a predicate will be resolved.
///
/// `IndexIntersect` is an intersection of groups, where each group is the
/// union of posting lists for its `(field, value)` pairs: an `Eq` child is
/// a single-pair group, an `In` child one pair per listed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    IndexIntersect { groups: Vec<Vec<(String, Value)>> },
    IndexUnion { lookups: Vec<(String, Value)> },
    FullScan,
}

fn is_indexed(field: &str, indexed_fields: &[String]) -> bool {
    indexed_fields.iter().any(|f| f == field)
}

/// Apply the planning rules of the executor, in order:
///
/// 1. `Eq` on an indexed field → single index lookup.
/// 2. `And` containing indexed `Eq`/`In` children → intersect their
///    postings; the full predicate runs as residual filter after fetch.
/// 3. `Or` where every child is an indexed `Eq` → union postings.
/// 4. Anything else → full scan with streaming evaluation.
pub fn plan(predicate: Option<&Predicate>, indexed_fields: &[String]) -> Plan {
    let Some(predicate) = predicate else {
        return Plan::FullScan;
    };
    match predicate {
        Predicate::Eq(field, value) if is_indexed(field, indexed_fields) => {
            Plan::IndexIntersect {
                groups: vec![vec![(field.clone(), value.clone())]],
            }
        }
        Predicate::In(field, values) if is_indexed(field, indexed_fields) => {
            Plan::IndexIntersect {
                groups: vec![values
                    .iter()
                    .map(|v| (field.clone(), v.clone()))
                    .collect()],
            }
        }
        Predicate::And(children) => {
            let mut groups = Vec::new();
            for child in children {
                match child {
                    Predicate::Eq(field, value) if is_indexed(field, indexed_fields) => {
                        groups.push(vec![(field.clone(), value.clone())]);
                    }
                    Predicate::In(field, values)
                        if is_indexed(field, indexed_fields) && !values.is_empty() =>
                    {
                        groups.push(
                            values.iter().map(|v| (field.clone(), v.clone())).collect(),
                        );
                    }
                    _ => {}
                }
            }
            if groups.is_empty() {
                Plan::FullScan
            } else {
                Plan::IndexIntersect { groups }
            }
        }
        Predicate::Or(children) => {
            let mut lookups = Vec::new();
            for child in children {
                match child {
                    Predicate::Eq(field, value) if is_indexed(field, indexed_fields) => {
                        lookups.push((field.clone(), value.clone()));
                    }
                    // One non-indexed disjunct may match rows outside any
                    // posting list, so the union is unsound; fall back.
                    _ => return Plan::FullScan,
                }
            }
            Plan::IndexUnion { lookups }
        }
        _ => Plan::FullScan,
    }
}

/// Execution-path counters, observable for tests and diagnostics.
#[derive(Debug, Default)]
pub struct ExecStats {
    index_lookups: AtomicU64,
    index_intersections: AtomicU64,
    index_unions: AtomicU64,
    full_scans: AtomicU64,
    vector_searches: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStatsSnapshot {
    pub index_lookups: u64,
    pub index_intersections: u64,
    pub index_unions: u64,
    pub full_scans: u64,
    pub vector_searches: u64,
}

impl ExecStats {
    pub fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_index_intersection(&self) {
        self.index_intersections.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_index_union(&self) {
        self.index_unions.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_full_scan(&self) {
        self.full_scans.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_vector_search(&self) {
        self.vector_searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExecStatsSnapshot {
        ExecStatsSnapshot {
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            index_intersections: self.index_intersections.load(Ordering::Relaxed),
            index_unions: self.index_unions.load(Ordering::Relaxed),
            full_scans: self.full_scans.load(Ordering::Relaxed),
            vector_searches: self.vector_searches.load(Ordering::Relaxed),
        }
    }
}

/// Project one entity into a result row. `fields = None` is `SELECT *`
/// (the payload); named fields resolve by dotted path with `null` for
/// misses. A similarity score attaches as `_score`.
pub fn project(entity: &Entity, fields: Option<&[String]>, score: Option<f32>) -> Value {
    let mut row = match fields {
        None => entity.properties.clone(),
        Some(fields) => {
            let mut row = Map::new();
            for field in fields {
                row.insert(field.clone(), entity.field(field).unwrap_or(Value::Null));
            }
            row
        }
    };
    if let Some(score) = score {
        row.insert("_score".to_string(), serde_json::json!(score));
    }
    Value::Object(row)
}
