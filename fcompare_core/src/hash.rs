use crate::comparator::open_file;
use fcompare_common::{Result, Sha256Digest};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_HASH_CHUNK_SIZE: usize = 8192;

/// SHA-256 of a whole file, streamed through `chunk_size` blocks
pub fn sha256_file(path: &Path, chunk_size: usize) -> Result<Sha256Digest> {
    let file = open_file(path)?;
    let digest = sha256_reader(file, chunk_size)?;
    debug!("SHA-256 of {:?}: {}", path, digest);
    Ok(digest)
}

pub fn sha256_reader<R: Read>(mut reader: R, chunk_size: usize) -> Result<Sha256Digest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Ok(Sha256Digest(digest))
}
