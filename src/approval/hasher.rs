//! Streaming SHA-256 content hashing.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{AppError, Result};

/// Bytes read per chunk; memory use is bounded by this regardless of file size.
const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 hex digest of a file's contents.
///
/// # Errors
///
/// Returns `AppError::Io` if the file cannot be opened or a read fails
/// mid-stream. An unreadable binary is never treated as unchanged.
pub async fn hash_file(path: &Path) -> Result<String> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|err| AppError::Io(format!("cannot open {}: {err}", path.display())))?;

    hash_reader(file)
        .await
        .map_err(|err| AppError::Io(format!("cannot hash {}: {err}", path.display())))
}

/// Fold a byte stream into a SHA-256 hex digest, one chunk at a time.
///
/// # Errors
///
/// Returns the underlying I/O error if a read fails.
pub async fn hash_reader<R>(mut reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; CHUNK_SIZE];

    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
