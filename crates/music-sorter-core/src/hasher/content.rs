use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::error;

/// Read size used when streaming a whole file through the hasher.
pub const FULL_HASH_BLOCK_SIZE: usize = 8 * 1024;

/// Cheap candidate-duplicate fingerprint: BLAKE3 over the first `chunk_size_bytes`
/// of the file followed by the decimal file size.
///
/// Returns `None` when the file cannot be read; such files stay in the catalog
/// but never take part in duplicate grouping.
pub fn partial_hash(path: &Path, chunk_size_bytes: u64) -> Option<String> {
    match hash_prefix(path, chunk_size_bytes) {
        Ok(hash) => Some(hash),
        Err(e) => {
            error!("Error hashing file '{}': {}", path.display(), e);
            None
        }
    }
}

/// BLAKE3 over the entire file, streamed in 8 KiB blocks. Used for copy verification.
pub fn full_hash(path: &Path) -> Option<String> {
    match hash_stream(path) {
        Ok(hash) => Some(hash),
        Err(e) => {
            error!("Error hashing file '{}': {}", path.display(), e);
            None
        }
    }
}

/// True iff both files hash successfully and the digests are equal.
pub fn verify_copy(source: &Path, target: &Path) -> bool {
    match (full_hash(source), full_hash(target)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn hash_prefix(path: &Path, chunk_size_bytes: u64) -> io::Result<String> {
    let f = File::open(path)?;
    let mut buffer = Vec::new();
    f.take(chunk_size_bytes).read_to_end(&mut buffer)?;
    let file_size = fs::metadata(path)?.len();

    let mut hasher = blake3::Hasher::new();
    hasher.update(&buffer);
    hasher.update(file_size.to_string().as_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_stream(path: &Path) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; FULL_HASH_BLOCK_SIZE];
    loop {
        let bytes_read = f.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
