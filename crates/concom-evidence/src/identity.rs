//! Deterministic evidence identity.
//!
//! Evidence records represent the same logical observation over time, so
//! they carry a UUID derived from a seed map rather than a random one:
//! re-running the same policy for the same plugin on the same agent yields
//! the same UUID, and any change to the seed yields a different one.

use std::collections::BTreeMap;

use uuid::Uuid;

/// Seed key identifying the record type.
pub const SEED_TYPE: &str = "type";

/// Seed key carrying the pure policy package.
pub const SEED_POLICY: &str = "policy";

/// Seed key carrying the policy module file.
pub const SEED_POLICY_FILE: &str = "policy_file";

/// Hash a seed map into a stable UUID.
///
/// The map is rendered in sorted key order, so two seeds with the same
/// entries produce the same UUID regardless of how they were built.
pub fn seeded_uuid(seed: &BTreeMap<String, String>) -> Uuid {
    let mut canonical = String::new();
    for (key, value) in seed {
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(value);
        canonical.push('\n');
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, canonical.as_bytes())
}

/// The seed map of one evidence record: its merged labels plus the record
/// type and policy identity.
pub fn evidence_seed(
    labels: &BTreeMap<String, String>,
    policy_package: &str,
    policy_file: &str,
) -> BTreeMap<String, String> {
    let mut seed = labels.clone();
    seed.insert(SEED_TYPE.to_string(), "evidence".to_string());
    seed.insert(SEED_POLICY.to_string(), policy_package.to_string());
    seed.insert(SEED_POLICY_FILE.to_string(), policy_file.to_string());
    seed
}
