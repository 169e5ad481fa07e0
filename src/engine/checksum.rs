//! Checksums of migration scripts

use sha2::{Digest, Sha256};

/// Hexadecimal SHA-256 of the script contents
///
/// Stored in the history table so that scripts edited after being applied
/// are detected on the next run.
///
/// # Arguments
///
/// * `contents` - Script text exactly as read, line endings included
///
/// # Returns
///
/// 64 lowercase hex characters
pub fn calculate_checksum(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            calculate_checksum(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_whitespace_changes_checksum() {
        let original = calculate_checksum("CREATE TABLE t (id INT);");
        assert_eq!(original.len(), 64);
        assert_ne!(original, calculate_checksum("CREATE TABLE t (id INT); "));
    }
}
