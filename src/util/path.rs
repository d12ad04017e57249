//! Filesystem helpers for the IPC transport's socket path handling,
//! grounded on `util/path.go`'s `Exists`/`MakeFilePath`. Out of scope as a
//! standalone subsystem (§1); this is the minimal interface the IPC
//! transport (§4.6) needs.

use std::path::Path;

pub async fn exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Creates the parent directory of `path` if it doesn't already exist.
pub async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    if !exists(parent).await? {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
