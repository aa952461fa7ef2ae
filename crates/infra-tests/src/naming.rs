//! Collision-resistant names for provisioned resources.
//!
//! Every test case gets its own name so that parallel runs (locally or in CI)
//! never fight over the same IAM role, function or security group.

use uuid::Uuid;

/// Length of the random suffix appended to test names.
///
/// 12 hex characters = 48 bits of randomness, short enough to stay under
/// the 64-character limit AWS places on most resource names.
pub const UNIQUE_ID_LEN: usize = 12;

/// Generate a short random identifier (lowercase hex).
pub fn unique_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(UNIQUE_ID_LEN);
    id
}

/// Build a test name of the form `<prefix>-<unique id>`.
///
/// The prefix is lowercased so the result is valid for resources that reject
/// uppercase names (S3 buckets, for example).
pub fn test_name(prefix: &str) -> String {
    format!("{}-{}", prefix.to_lowercase(), unique_id())
}
