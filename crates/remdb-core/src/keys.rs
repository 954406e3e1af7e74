//! Tenant-scoped key construction.
//!
//! All keys are `:`-joined UTF-8 strings of the form `<kind>:<tenant>:<parts…>`.
//! Tenant isolation rests entirely on these prefixes, so every key that holds
//! user data MUST be built through this module. WAL entry keys zero-pad the
//! sequence number to 20 digits so lexicographic order equals numeric order.

use uuid::Uuid;

pub fn entity(tenant: &str, id: Uuid) -> Vec<u8> {
    format!("entity:{tenant}:{id}").into_bytes()
}

pub fn entity_prefix(tenant: &str) -> Vec<u8> {
    format!("entity:{tenant}:").into_bytes()
}

pub fn schema(tenant: &str, name: &str) -> Vec<u8> {
    format!("schema:{tenant}:{name}").into_bytes()
}

pub fn schema_prefix(tenant: &str) -> Vec<u8> {
    format!("schema:{tenant}:").into_bytes()
}

pub fn edge(tenant: &str, src: Uuid, dst: Uuid, rel_type: &str) -> Vec<u8> {
    format!("edge:{tenant}:{src}:{dst}:{rel_type}").into_bytes()
}

/// Prefix matching every edge leaving `src`.
pub fn edge_out_prefix(tenant: &str, src: Uuid) -> Vec<u8> {
    format!("edge:{tenant}:{src}:").into_bytes()
}

/// Prefix matching every edge row of the tenant.
pub fn edge_prefix(tenant: &str) -> Vec<u8> {
    format!("edge:{tenant}:").into_bytes()
}

pub fn moment(tenant: &str, id: Uuid) -> Vec<u8> {
    format!("moment:{tenant}:{id}").into_bytes()
}

pub fn moment_prefix(tenant: &str) -> Vec<u8> {
    format!("moment:{tenant}:").into_bytes()
}

/// Time-ordered parallel index for moments. RFC 3339 timestamps in UTC sort
/// lexicographically in time order.
pub fn moment_time(tenant: &str, timestamp_rfc3339: &str, id: Uuid) -> Vec<u8> {
    format!("moment_time:{tenant}:{timestamp_rfc3339}:{id}").into_bytes()
}

pub fn moment_time_prefix(tenant: &str) -> Vec<u8> {
    format!("moment_time:{tenant}:").into_bytes()
}

/// Alias rows map a lowercased alias string to the owning entity id.
pub fn alias(tenant: &str, value: &str) -> Vec<u8> {
    format!("alias:{tenant}:{}", value.to_lowercase()).into_bytes()
}

/// Secondary-index posting list for one `(schema, field, canonical value)`.
pub fn index(schema: &str, tenant: &str, field: &str, canonical: &str) -> Vec<u8> {
    format!("index:{schema}:{tenant}:{field}:{canonical}").into_bytes()
}

pub fn index_prefix(schema: &str, tenant: &str) -> Vec<u8> {
    format!("index:{schema}:{tenant}:").into_bytes()
}

pub fn vector_map_handle(tenant: &str, handle: u32) -> Vec<u8> {
    format!("vector_map:{tenant}:handle:{handle}").into_bytes()
}

pub fn vector_map_id(tenant: &str, id: Uuid) -> Vec<u8> {
    format!("vector_map:{tenant}:id:{id}").into_bytes()
}

pub fn vector_map_next(tenant: &str) -> Vec<u8> {
    format!("vector_map:{tenant}:next").into_bytes()
}

pub fn vector_map_handle_prefix(tenant: &str) -> Vec<u8> {
    format!("vector_map:{tenant}:handle:").into_bytes()
}

pub fn wal_seq(tenant: &str) -> Vec<u8> {
    format!("wal:{tenant}:seq").into_bytes()
}

pub fn wal_entry(tenant: &str, seq: u64) -> Vec<u8> {
    format!("wal:{tenant}:entry:{seq:020}").into_bytes()
}

pub fn wal_entry_prefix(tenant: &str) -> Vec<u8> {
    format!("wal:{tenant}:entry:").into_bytes()
}

/// Follower-side replication watermark for one upstream peer.
pub fn watermark(tenant: &str, peer_id: &str) -> Vec<u8> {
    format!("watermark:{tenant}:{peer_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wal_entry_keys_sort_numerically() {
        let a = wal_entry("t", 9);
        let b = wal_entry("t", 10);
        let c = wal_entry("t", 1_000_000);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn tenants_do_not_share_prefixes() {
        let a = entity_prefix("alpha");
        let b = entity_prefix("beta");
        let key = entity("alpha", Uuid::nil());
        assert!(key.starts_with(&a));
        assert!(!key.starts_with(&b));
    }

    #[test]
    fn alias_keys_are_case_insensitive() {
        assert_eq!(alias("t", "DHL"), alias("t", "dhl"));
    }
}
