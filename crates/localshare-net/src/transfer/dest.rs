//! Destination file naming.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

const FALLBACK_NAME: &str = "download";

/// Final path component of a peer-supplied name. Separators of either
/// platform are stripped so a name can never escape the download directory.
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        other => other.to_string(),
    }
}

/// `name(n).ext` for `n`, or `name(n)` without an extension.
fn numbered(filename: &str, n: u32) -> String {
    match filename.rfind('.') {
        Some(dot) if dot > 0 => format!("{}({n}){}", &filename[..dot], &filename[dot..]),
        _ => format!("{filename}({n})"),
    }
}

/// Create an empty file for `filename` in `dir` under the first free name
/// among `name.ext`, `name(1).ext`, `name(2).ext`, ... and return its path.
/// Creation is atomic, so two transfers never get the same path.
pub fn reserve_destination(dir: &Path, filename: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let filename = sanitize_filename(filename);

    let mut n = 0u32;
    loop {
        let candidate = if n == 0 {
            dir.join(&filename)
        } else {
            dir.join(numbered(&filename, n))
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

/// A previously chosen path can be written again if its directory still
/// exists.
pub fn is_reusable(path: &Path) -> bool {
    path.parent().map_or(false, Path::is_dir) && !path.is_dir()
}
