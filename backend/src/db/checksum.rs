//! Checksums of uploaded import files, recorded with each import outcome.

use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of raw file content.
///
/// # Returns
/// Hexadecimal string representation of the SHA-256 hash.
pub fn calculate_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = b"PK\x03\x04 workbook bytes";
        assert_eq!(calculate_checksum(content), calculate_checksum(content));
        assert_eq!(calculate_checksum(content).len(), 64);
    }

    #[test]
    fn test_different_content_different_checksum() {
        assert_ne!(calculate_checksum(b"cognos"), calculate_checksum(b"sap"));
    }
}
