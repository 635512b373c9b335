//! Filesystem message passing with the rest of the appliance.
//!
//! Two shapes only: command files are consumed with [`read_and_delete`]
//! (at-most-once, the reader owns deletion) and state files are published
//! with [`overwrite`] (last write wins, readers must tolerate torn or missing
//! content). Neither uses locking or atomic rename.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Read a command file and remove it.
///
/// Returns `Ok(None)` when the file does not exist. The file is removed even
/// when reading fails so a corrupt command cannot wedge the caller.
pub fn read_and_delete(path: &Path) -> Result<Option<String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            delete_if_exists(path)?;
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    delete_if_exists(path)?;
    Ok(content)
}

pub fn overwrite(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

pub fn delete_if_exists(p: &Path) -> Result<()> {
    match fs::remove_file(p) {
        Ok(()) => {
            debug!(path = %p.display(), "delete: removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %p.display(), "delete: already gone; skipping");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", p.display())),
    }
}

/// Best-effort variant used on shutdown paths where nothing can be retried.
pub fn remove_quietly(p: &Path) {
    if let Err(err) = delete_if_exists(p) {
        warn!(path = %p.display(), "{err:#}");
    }
}
