//! Atomic file operations
//!
//! Used for the store journal compaction and for `state.json`.
//!
//! # Pattern
//!
//! 1. Write to a temporary file (.tmp)
//! 2. Call sync_all() to flush to disk
//! 3. Rename temp file to final path
//!
//! A crash leaves either the old file or the new one, never a torn write.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Atomically replace `path` with `content`
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> io::Result<()> {
    atomic_write_with(path, |writer| writer.write_all(content))
}

/// Atomically replace `path` with whatever `write_fn` produces
///
/// # Example
///
/// ```ignore
/// atomic_write_with("data/events.jsonl", |out| {
///     writeln!(out, "line1")?;
///     writeln!(out, "line2")
/// })?;
/// ```
pub fn atomic_write_with<P, F>(path: P, write_fn: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let path = path.as_ref();
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(&temp_path)?);
    write_fn(&mut writer)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Remove `.tmp` leftovers of an interrupted write; returns how many were removed
pub fn cleanup_temp_files<P: AsRef<Path>>(dir: P) -> io::Result<usize> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(0);
    }

    let mut cleaned = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "tmp").unwrap_or(false) {
            fs::remove_file(&path)?;
            cleaned += 1;
        }
    }

    Ok(cleaned)
}
