//! Predicate algebra for structured queries.
//!
//! Field extraction walks `properties.*` first, then the entity's system
//! fields; dotted paths reach nested objects. Comparison coercion: both
//! operands numeric → numeric compare; both strings → lexicographic, unless
//! both parse as ISO-8601 datetimes, which compare as instants; mismatched
//! types are never equal and never ordered.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::types::{Entity, Order};

/// Closed predicate node set.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    /// Case-sensitive substring match on strings, membership on arrays.
    Contains(String, Value),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn evaluate(&self, entity: &Entity) -> bool {
        match self {
            Predicate::Eq(field, v) => compare(entity.field(field).as_ref(), v)
                .map(Ordering::is_eq)
                .unwrap_or(false),
            Predicate::Ne(field, v) => compare(entity.field(field).as_ref(), v)
                .map(Ordering::is_ne)
                .unwrap_or(true),
            Predicate::Lt(field, v) => compare(entity.field(field).as_ref(), v)
                .map(Ordering::is_lt)
                .unwrap_or(false),
            Predicate::Lte(field, v) => compare(entity.field(field).as_ref(), v)
                .map(Ordering::is_le)
                .unwrap_or(false),
            Predicate::Gt(field, v) => compare(entity.field(field).as_ref(), v)
                .map(Ordering::is_gt)
                .unwrap_or(false),
            Predicate::Gte(field, v) => compare(entity.field(field).as_ref(), v)
                .map(Ordering::is_ge)
                .unwrap_or(false),
            Predicate::In(field, values) => {
                let actual = entity.field(field);
                values.iter().any(|v| {
                    compare(actual.as_ref(), v)
                        .map(Ordering::is_eq)
                        .unwrap_or(false)
                })
            }
            Predicate::Contains(field, needle) => match entity.field(field) {
                Some(Value::String(haystack)) => needle
                    .as_str()
                    .map(|n| haystack.contains(n))
                    .unwrap_or(false),
                Some(Value::Array(items)) => items.contains(needle),
                _ => false,
            },
            Predicate::And(children) => children.iter().all(|p| p.evaluate(entity)),
            Predicate::Or(children) => children.iter().any(|p| p.evaluate(entity)),
            Predicate::Not(inner) => !inner.evaluate(entity),
        }
    }
}

/// Coercing comparison between an extracted field value and a literal.
/// `None` when the pair is incomparable (missing field or type mismatch).
pub fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    let actual = actual?;
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => {
            if let (Some(ta), Some(tb)) = (parse_datetime(a), parse_datetime(b)) {
                Some(ta.cmp(&tb))
            } else {
                Some(a.cmp(b))
            }
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A query over one schema's rows: filter, sort, paginate.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub predicate: Option<Predicate>,
    pub order_by: Option<(String, Order)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => Predicate::And(vec![existing, predicate]),
            None => predicate,
        });
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }
}

/// Sort entities in place by one field. Missing values sort last in ASC
/// (first in DESC, by symmetry of the reversal).
pub fn sort_entities(entities: &mut [Entity], field: &str, order: Order) {
    entities.sort_by(|a, b| {
        let va = a.field(field);
        let vb = b.field(field);
        let ord = match (&va, &vb) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => compare(Some(x), y).unwrap_or(Ordering::Equal),
        };
        match order {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    });
}

/// Apply offset/limit pagination.
pub fn paginate<T>(mut items: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    if let Some(offset) = offset {
        if offset >= items.len() {
            return Vec::new();
        }
        items.drain(..offset);
    }
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}
