use sha2::{Digest, Sha256};

/// Generates an unguessable per-feed access token (32 lowercase hex chars).
pub fn generate_access_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Compares a supplied token against the stored one.
///
/// Both sides are hashed first so the comparison time does not depend on
/// how long a common prefix the caller guessed.
pub fn tokens_match(expected: &str, supplied: Option<&str>) -> bool {
    let Some(supplied) = supplied else {
        return false;
    };
    Sha256::digest(expected.as_bytes()) == Sha256::digest(supplied.as_bytes())
}
