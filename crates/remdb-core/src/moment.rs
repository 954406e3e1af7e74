//! Moments: temporal groupings of entities and resources.
//!
//! Each moment row has a parallel `moment_time:<rfc3339>:<id>` key so time
//! ranges resolve with one ordered prefix scan instead of a full decode of
//! every moment.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::keys;
use crate::kv::{Store, WriteOp};
use crate::types::Moment;

fn time_component(ts: DateTime<Utc>) -> String {
    // Fixed-width UTC form so lexicographic order equals time order.
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Ops for creating (or overwriting) one moment.
pub fn put_ops(tenant: &str, moment: &Moment) -> Result<Vec<WriteOp>> {
    let time_key = keys::moment_time(tenant, &time_component(moment.timestamp), moment.id);
    Ok(vec![
        WriteOp::put(keys::moment(tenant, moment.id), serde_json::to_vec(moment)?),
        WriteOp::put(
            time_key,
            serde_json::to_vec(&serde_json::json!({ "moment_id": moment.id }))?,
        ),
    ])
}

/// Ops for deleting one moment and its time-index row.
pub fn delete_ops(tenant: &str, moment: &Moment) -> Vec<WriteOp> {
    vec![
        WriteOp::delete(keys::moment(tenant, moment.id)),
        WriteOp::delete(keys::moment_time(
            tenant,
            &time_component(moment.timestamp),
            moment.id,
        )),
    ]
}

pub fn get(store: &Store, tenant: &str, id: Uuid) -> Result<Option<Moment>> {
    match store.get(&keys::moment(tenant, id))? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub fn list(store: &Store, tenant: &str) -> Result<Vec<Moment>> {
    let mut moments = Vec::new();
    for bytes in store.scan_prefix_values(&keys::moment_prefix(tenant))? {
        moments.push(serde_json::from_slice(&bytes)?);
    }
    Ok(moments)
}

/// Moments with `start <= timestamp < end`, in time order, resolved through
/// the time index.
pub fn between(
    store: &Store,
    tenant: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Moment>> {
    let start_component = time_component(start);
    let end_component = time_component(end);
    let mut out = Vec::new();
    for (key, _) in store.scan_prefix(&keys::moment_time_prefix(tenant))? {
        let key = String::from_utf8_lossy(&key);
        // moment_time:<tenant>:<rfc3339>:<uuid>; the uuid is the suffix.
        let Some(rest) = key.strip_prefix(&format!("moment_time:{tenant}:")) else {
            continue;
        };
        let Some((ts, id)) = rest.rsplit_once(':') else {
            continue;
        };
        if ts < start_component.as_str() {
            continue;
        }
        if ts >= end_component.as_str() {
            break;
        }
        if let Ok(id) = id.parse::<Uuid>() {
            if let Some(moment) = get(store, tenant, id)? {
                out.push(moment);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn moment_at(ts: DateTime<Utc>, kind: &str) -> Moment {
        Moment {
            id: Uuid::new_v4(),
            timestamp: ts,
            kind: kind.into(),
            classifications: vec!["meeting".into()],
            resource_refs: vec![],
            entity_refs: vec![],
            parent_moment: None,
            metadata: Default::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn time_range_scan_is_ordered_and_bounded() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let t = |h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap();

        for hour in [9, 11, 13, 15] {
            let m = moment_at(t(hour), "standup");
            store.batch(put_ops("t1", &m).unwrap()).unwrap();
        }

        let hits = between(&store, "t1", t(10), t(14)).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].timestamp, t(11));
        assert_eq!(hits[1].timestamp, t(13));
    }

    #[test]
    fn delete_removes_both_rows() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let m = moment_at(Utc::now(), "standup");
        store.batch(put_ops("t1", &m).unwrap()).unwrap();
        assert!(get(&store, "t1", m.id).unwrap().is_some());

        store.batch(delete_ops("t1", &m)).unwrap();
        assert!(get(&store, "t1", m.id).unwrap().is_none());
        assert!(store
            .scan_prefix(&keys::moment_time_prefix("t1"))
            .unwrap()
            .is_empty());
    }
}
