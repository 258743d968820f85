/// Content hashing for exact-duplicate detection
use crate::error::Result;
use crate::types::ContentHash;

use std::{fs::File, io::Read, path::Path};

/// Compute the content hash of a file using the Blake3 algorithm
pub fn content_hash<P: AsRef<Path>>(path: P) -> Result<ContentHash> {
    // Open the file with explicit scope to ensure it's closed promptly
    let hash = {
        let mut file = File::open(&path)?;
        let mut hasher = blake3::Hasher::new();

        // Read the file in chunks and update the hasher
        let mut buffer = [0; 65536];
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        hasher.finalize()
    };

    Ok(hash.into())
}
