//! Whole-file content hashing.
//!
//! The content hash identifies a file version across transfer attempts and
//! gates the final integrity check, so sender and receiver must agree on it.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_BUF: usize = 64 * 1024;

/// BLAKE3 hex digest of everything `reader` yields.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// BLAKE3 hex digest of the file at `path`.
pub fn hash_file(path: &Path) -> io::Result<String> {
    hash_reader(File::open(path)?)
}

/// Same as [`hash_file`], run on the blocking pool.
pub async fn hash_file_async(path: &Path) -> io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}
