use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};

use crate::db::entities::image;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Layout of uploaded originals and their thumbnails on disk.
#[derive(Debug, Clone)]
pub struct MediaStore {
    images_dir: PathBuf,
    thumbnails_dir: PathBuf,
    last_stamp: Arc<AtomicI64>,
}

impl MediaStore {
    pub fn new(upload_dir: impl AsRef<Path>) -> Self {
        let root = upload_dir.as_ref();
        Self {
            images_dir: root.join("images"),
            thumbnails_dir: root.join("thumbnails"),
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn thumbnails_dir(&self) -> &Path {
        &self.thumbnails_dir
    }

    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [&self.images_dir, &self.thumbnails_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::CreateDir { path: dir.clone(), source })?;
        }
        Ok(())
    }

    /// Nanosecond stamp, strictly increasing within this process.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// `{user_id}-{nanos}{ext}`, keeping the original's lower-cased extension.
    pub fn allocate_name(&self, user_id: i32, original_name: &str) -> String {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        format!("{user_id}-{}{ext}", self.next_stamp())
    }

    pub fn image_path(&self, name: &str) -> PathBuf {
        self.images_dir.join(name)
    }

    pub fn thumbnail_path(&self, name: &str) -> PathBuf {
        self.thumbnails_dir.join(name)
    }

    pub async fn save_original(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.image_path(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write { path: path.clone(), source })?;
        debug!(path = %path.display(), size = bytes.len(), "Saved original.");
        Ok(path)
    }

    /// Removes a stored file, logging instead of failing.
    pub async fn remove_file(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed file."),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file."),
        }
    }

    /// Removes an image's original and thumbnail. Failures are only logged.
    pub async fn remove_image_files(&self, image: &image::Model) {
        self.remove_file(Path::new(&image.file_path)).await;
        if image.thumbnail_path != image.file_path {
            self.remove_file(Path::new(&image.thumbnail_path)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_allocated_names_are_unique_and_keep_extension() {
        let store = MediaStore::new("uploads");
        let a = store.allocate_name(7, "Holiday.JPG");
        let b = store.allocate_name(7, "Holiday.JPG");
        assert_ne!(a, b);
        assert!(a.starts_with("7-"));
        assert!(a.ends_with(".jpg"));
        assert!(!store.allocate_name(7, "README").contains('.'));
        assert_eq!(store.image_path(&a), Path::new("uploads/images").join(&a));
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let name = store.allocate_name(1, "a.png");
        let path = store.save_original(&name, b"data").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"data");

        store.remove_file(&path).await;
        assert!(!path.exists());
        // Second removal only warns.
        store.remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_save_into_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("nope"));
        let err = store.save_original("x.png", b"data").await.unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
    }
}
