//! Run identifiers and content-addressed artifact ids.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Number of hex characters of the payload digest kept in an artifact id.
const CONTENT_HASH_LEN: usize = 12;

/// Generates a new run id (UUID v4).
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

/// Builds a stable artifact id of the form `{variable}-{sha256[..12]}`.
///
/// The same payload bound to the same variable always yields the same id.
#[must_use]
pub fn content_id(variable: &str, payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let hex = hex::encode(digest);
    format!("{variable}-{}", &hex[..CONTENT_HASH_LEN])
}
