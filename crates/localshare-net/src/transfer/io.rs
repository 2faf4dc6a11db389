//! Positional writes into a shared file handle.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Open (creating if needed) `path` for random-access writing, sized to
/// `len` bytes. Existing content is kept so resumed chunks stay valid.
pub async fn open_sized(path: &Path, len: u64) -> io::Result<Arc<File>> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        file.set_len(len)?;
        Ok(Arc::new(file))
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Write all of `buf` at `offset` without moving a shared cursor.
pub async fn write_at<B>(file: Arc<File>, buf: B, offset: u64) -> io::Result<()>
where
    B: AsRef<[u8]> + Send + 'static,
{
    tokio::task::spawn_blocking(move || write_all_at(&file, buf.as_ref(), offset))
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Flush written data of `file` to disk.
pub async fn sync(file: Arc<File>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || file.sync_data())
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
