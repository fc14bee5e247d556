//! Chunked SHA-256 content hashing.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read granularity for hashing.
const HASH_CHUNK_SIZE: usize = 128 * 1024;

/// Hash a file's content, returning the lowercase hex SHA-256 digest.
/// Purely content-based; file metadata never enters the digest. Callers
/// treat a failure as "skip this file this cycle".
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_known_digest() -> io::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"hello")?;
        file.flush()?;

        let digest = hash_file(file.path())?;
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        Ok(())
    }

    #[test]
    fn test_empty_file() -> io::Result<()> {
        let file = NamedTempFile::new()?;
        let digest = hash_file(file.path())?;
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        Ok(())
    }

    #[test]
    fn test_identical_content_identical_digest() -> io::Result<()> {
        let mut a = NamedTempFile::new()?;
        let mut b = NamedTempFile::new()?;
        let payload = vec![0xabu8; 300 * 1024]; // spans multiple chunks
        a.write_all(&payload)?;
        b.write_all(&payload)?;
        a.flush()?;
        b.flush()?;

        assert_eq!(hash_file(a.path())?, hash_file(b.path())?);
        Ok(())
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(hash_file(Path::new("/nonexistent/file")).is_err());
    }
}
