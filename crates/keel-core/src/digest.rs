//! SHA-256 digests of pipeline definitions.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Deterministic digest of an ordered list of parts.
///
/// Parts are NUL-separated so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn ordered_digest<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_ordered_digest_order_sensitive() {
        assert_ne!(ordered_digest(["fix", "fmt"]), ordered_digest(["fmt", "fix"]));
        assert_eq!(ordered_digest(["fix", "fmt"]), ordered_digest(["fix", "fmt"]));
    }

    #[test]
    fn test_ordered_digest_separates_parts() {
        assert_ne!(ordered_digest(["ab", "c"]), ordered_digest(["a", "bc"]));
    }
}
