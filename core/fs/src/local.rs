//! Local filesystem side of the façade.

use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::fs;

use stowage_common::{Error, FileEntry, Result};

/// Read a local file.
///
/// # Errors
/// - File not found
/// - Path is a directory
pub async fn read(path: &Path) -> Result<Vec<u8>> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Err(Error::InvalidInput(format!(
            "Cannot read directory: {}",
            path.display()
        ))),
        Ok(_) => Ok(fs::read(path).await?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
            "File not found: {}",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Write a local file, creating parent directories as needed.
pub async fn write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(path, data).await?;
    Ok(())
}

/// Check if a local path exists.
pub async fn exists(path: &Path) -> Result<bool> {
    Ok(fs::try_exists(path).await?)
}

/// Delete a local file.
///
/// # Errors
/// - File not found
/// - Path is a directory
pub async fn delete(path: &Path) -> Result<()> {
    let meta = fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            Error::NotFound(format!("File not found: {}", path.display()))
        }
        _ => e.into(),
    })?;
    if meta.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Refusing to delete directory: {}",
            path.display()
        )));
    }
    fs::remove_file(path).await?;
    Ok(())
}

/// List the direct children of a local directory.
///
/// Entries are sorted by name.
pub async fn list(path: &Path) -> Result<Vec<FileEntry>> {
    let mut dir = fs::read_dir(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            Error::NotFound(format!("Directory not found: {}", path.display()))
        }
        _ => e.into(),
    })?;

    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let meta = entry.metadata().await?;
        let modified: DateTime<Utc> = meta
            .modified()
            .map(|t| t.into())
            .unwrap_or_else(|_| Utc::now());
        let name = entry.file_name().to_string_lossy().into_owned();
        let full = entry.path().to_string_lossy().into_owned();

        entries.push(if meta.is_dir() {
            FileEntry::directory(name, full, modified)
        } else {
            FileEntry::file(name, full, meta.len(), modified)
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
