//! services/api/src/adapters/storage.rs
//!
//! Stores uploaded PDFs on the local file system under the media root and
//! implements the `FileStorage` port from the `core` crate.

use async_trait::async_trait;
use bytes::Bytes;
use readers_core::ports::{FileStorage, PortError, PortResult};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Sub-directory of the media root that holds workbook PDFs.
const UPLOAD_DIR: &str = "workbooks";

/// A `FileStorage` backed by a directory on the local disk.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalFileStorage {
    /// Creates a storage rooted at `root` whose files are served under `base_url`.
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the media root if it does not exist yet.
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.root.join(UPLOAD_DIR)).await
    }

    /// Resolves a storage path below the root, refusing anything that
    /// would escape it.
    fn resolve(&self, path: &str) -> PortResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || path.is_empty() {
            return Err(PortError::Unexpected(format!(
                "Refusing to touch storage path '{}'",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

/// Reduces an uploaded file name to a safe base name.
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, file_name: &str, data: Bytes) -> PortResult<String> {
        let path = format!(
            "{}/{}_{}",
            UPLOAD_DIR,
            Uuid::new_v4().simple(),
            sanitize_file_name(file_name)
        );
        let full = self.resolve(&path)?;

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }
        tokio::fs::write(&full, &data)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(path)
    }

    async fn delete(&self, path: &str) -> PortResult<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_delete_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), "/media/");

        let path = storage
            .save("workbook-01.pdf", Bytes::from_static(b"%PDF-1.4"))
            .await
            .unwrap();
        assert!(path.starts_with("workbooks/"));
        assert!(path.ends_with("_workbook-01.pdf"));
        assert!(dir.path().join(&path).exists());
        assert_eq!(storage.url(&path), format!("/media/{}", path));

        storage.delete(&path).await.unwrap();
        assert!(!dir.path().join(&path).exists());

        // Deleting again is fine.
        storage.delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn refuses_paths_outside_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), "/media");
        assert!(storage.delete("../etc/passwd").await.is_err());
        assert!(storage.delete("/etc/passwd").await.is_err());
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../evil name.pdf"), "evil_name.pdf");
        assert_eq!(sanitize_file_name("C:\\docs\\book.pdf"), "book.pdf");
        assert_eq!(sanitize_file_name(""), "upload.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
    }
}
