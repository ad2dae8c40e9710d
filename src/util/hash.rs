//! Hashing utilities for completion markers and package manifests.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a string.
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// Compute SHA256 hash of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_str_stable() {
        assert_eq!(sha256_str("abc"), sha256_str("abc"));
        assert_ne!(sha256_str("abc"), sha256_str("abd"));
    }

    #[test]
    fn test_sha256_file_matches_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("f");
        std::fs::write(&path, b"toolchain").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(b"toolchain"));
    }
}
