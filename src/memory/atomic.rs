//! Crash-safe file replacement
//!
//! Content goes to a temp file in the target's directory, is flushed to disk,
//! then renamed over the target. Readers see the old file or the new one.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Atomically replace `path` with `contents`
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".memsync-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    tmp.write_all(contents)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temp file for {}", path.display()))?;

    // On error the temp file is removed when `tmp` drops
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}
