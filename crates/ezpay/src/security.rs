//! Secret comparison for the relay's operator endpoints.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Constant-time byte comparison that does not leak input lengths or content.
///
/// Both inputs are hashed to fixed-length SHA-256 digests before comparison,
/// so timing reveals neither the content nor the length of either input.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

/// Check an `Authorization` header value of the form `Bearer <token>`.
pub fn bearer_matches(header: Option<&str>, expected: &[u8]) -> bool {
    header
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| constant_time_eq(t.as_bytes(), expected))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_match() {
        assert!(constant_time_eq(b"hello", b"hello"));
    }

    #[test]
    fn different_length_inputs_do_not_match() {
        assert!(!constant_time_eq(b"short", b"much longer string"));
    }

    #[test]
    fn bearer_prefix_required() {
        assert!(bearer_matches(Some("Bearer s3cret"), b"s3cret"));
        assert!(!bearer_matches(Some("s3cret"), b"s3cret"));
        assert!(!bearer_matches(Some("Bearer wrong"), b"s3cret"));
        assert!(!bearer_matches(None, b"s3cret"));
    }
}
