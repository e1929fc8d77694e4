//! Key layout for the ledger partitions.
//!
//! - `policies`: policy:{id:020} -> Policy (JSON)
//! - `records`: record:{id:020} -> DeliveryRecord (JSON)
//! - `projects`: project:{id:020} -> Project (JSON)
//! - `labels`: label:{id} -> Label (JSON)
//! - `metadata`: meta:{key} -> counters and prune state
//!
//! Numeric ids are zero padded so partition iteration yields id order.

pub const META_NEXT_POLICY_ID: &str = "next_policy_id";
pub const META_NEXT_RECORD_ID: &str = "next_record_id";
pub const META_LAST_PRUNE: &str = "last_prune";

pub fn encode_policy_key(id: u64) -> Vec<u8> {
    format!("policy:{:020}", id).into_bytes()
}

pub fn encode_record_key(id: u64) -> Vec<u8> {
    format!("record:{:020}", id).into_bytes()
}

pub fn decode_record_key(key: &[u8]) -> Option<u64> {
    std::str::from_utf8(key)
        .ok()?
        .strip_prefix("record:")?
        .parse()
        .ok()
}

pub fn encode_project_key(id: u64) -> Vec<u8> {
    format!("project:{:020}", id).into_bytes()
}

pub fn encode_label_key(id: i64) -> Vec<u8> {
    format!("label:{}", id).into_bytes()
}

pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
