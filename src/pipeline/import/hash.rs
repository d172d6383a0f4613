use base64::Engine;
use sha2::{Digest, Sha256};

/// SHA-256 of the upload bytes, base64-encoded. Identical bytes always
/// produce the same hash regardless of filename.
pub fn content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_deterministic() {
        assert_eq!(content_hash(b"receipt"), content_hash(b"receipt"));
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(content_hash(b"Content A"), content_hash(b"Content B"));
    }

    #[test]
    fn hash_is_base64_sha256() {
        // 32 bytes → 44 base64 characters with padding
        let h = content_hash(b"");
        assert_eq!(h.len(), 44);
        assert_eq!(h, "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
    }
}
