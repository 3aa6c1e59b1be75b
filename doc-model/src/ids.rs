//! Stable identifier derivation for files and chunks.
//!
//! `file_id` hashes cheap stat metadata so the indexer can detect candidate
//! changes without reading the file; `content_sha256` fingerprints the
//! extracted text for the strong second-level check. `chunk_id` is a
//! deterministic UUID so the same chunk always maps to the same point in the
//! vector store.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hex SHA-1 over `"path|mtime|size"`. Pure function of its inputs, stable
/// across processes and machines.
pub fn file_id(path: &str, mtime: i64, size: u64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{path}|{mtime}|{size}").as_bytes());
    hex::encode(hasher.finalize())
}

/// UUIDv5 in the DNS namespace over `"{file_id}_{idx}"`.
pub fn chunk_id(file_id: &str, idx: u32) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, format!("{file_id}_{idx}").as_bytes()).to_string()
}

/// Lowercase hex SHA-256 over the extracted text bytes.
pub fn content_sha256(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_stable_and_metadata_sensitive() {
        let a = file_id("/docs/report.txt", 1_700_000_000, 4096);
        let b = file_id("/docs/report.txt", 1_700_000_000, 4096);
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        assert_ne!(a, file_id("/docs/report.txt", 1_700_000_001, 4096));
        assert_ne!(a, file_id("/docs/report.txt", 1_700_000_000, 4097));
        assert_ne!(a, file_id("/docs/other.txt", 1_700_000_000, 4096));
    }

    #[test]
    fn chunk_id_is_deterministic_and_distinct_per_index() {
        let fid = file_id("/docs/report.txt", 1_700_000_000, 4096);
        assert_eq!(chunk_id(&fid, 0), chunk_id(&fid, 0));
        assert_ne!(chunk_id(&fid, 0), chunk_id(&fid, 1));
        // Hyphenated UUID form, accepted by ANN stores.
        assert_eq!(chunk_id(&fid, 0).len(), 36);
    }

    #[test]
    fn content_sha256_matches_known_digest() {
        // sha256("abc")
        assert_eq!(
            content_sha256("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_sha256("").len(), 64);
    }
}
