use sha2::{Digest, Sha256};

/// SHA-256 hex digest of raw item bytes.
///
/// No normalisation: a CRLF rewrite is a real change and must show up.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
