//! Process-local scratch files with guaranteed cleanup.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use stowage_common::Result;

/// A uniquely named file in a scratch directory.
///
/// The file is not created until something writes to [`ScratchFile::path`].
/// Whatever exists at that path is removed when the guard is dropped,
/// on success and failure paths alike.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve a scratch path under `dir`, creating `dir` if needed.
    ///
    /// Names combine the process id, a millisecond timestamp and a random
    /// suffix so concurrent operations never collide.
    pub async fn reserve(dir: &Path, purpose: &str, extension: &str) -> Result<Self> {
        fs::create_dir_all(dir).await?;
        let name = format!(
            "{}-{}-{}-{}.{}",
            purpose,
            std::process::id(),
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            extension
        );
        Ok(Self {
            path: dir.join(name),
        })
    }

    /// Path of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `data`, readable by the current user only on Unix.
    pub async fn write_private(&self, data: &[u8]) -> Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "Failed to remove scratch file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scratch_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let path = {
            let scratch = ScratchFile::reserve(temp.path(), "download", "bin").await.unwrap();
            fs::write(scratch.path(), b"payload").await.unwrap();
            assert!(scratch.path().exists());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_without_file_is_quiet() {
        let temp = TempDir::new().unwrap();
        let scratch = ScratchFile::reserve(temp.path(), "upload", "bin").await.unwrap();
        drop(scratch);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let temp = TempDir::new().unwrap();
        let a = ScratchFile::reserve(temp.path(), "x", "json").await.unwrap();
        let b = ScratchFile::reserve(temp.path(), "x", "json").await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_reserve_creates_directory() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b");
        let scratch = ScratchFile::reserve(&nested, "x", "json").await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(scratch.path().parent().unwrap(), nested.as_path());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_private_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let scratch = ScratchFile::reserve(temp.path(), "payload", "json").await.unwrap();
        scratch.write_private(b"{}").await.unwrap();
        let mode = std::fs::metadata(scratch.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
