use bytes::Bytes;
use sea_orm::{DatabaseConnection, DbErr};
use std::path::Path;
use tracing::{error, info, warn};

use crate::db::entities::image;
use crate::db::services::{NewImage, image_service};
use crate::media::{MediaStore, StorageError, extract_metadata, generate_thumbnail};

/// One file taken from a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Empty file: {0}")]
    EmptyFile(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Failed to save image record: {0}")]
    Database(#[from] DbErr),
}

/// Outcome of a batch upload. Failed files are only logged.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub images: Vec<image::Model>,
    pub failed: usize,
}

impl IngestReport {
    pub fn processed(&self) -> usize {
        self.images.len()
    }
}

/// Turns uploaded bytes into stored files, thumbnails and image records.
#[derive(Clone)]
pub struct IngestPipeline {
    db: DatabaseConnection,
    store: MediaStore,
}

impl IngestPipeline {
    pub fn new(db: DatabaseConnection, store: MediaStore) -> Self {
        Self { db, store }
    }

    /// Ingests every file independently; one failure never stops the rest.
    pub async fn ingest_batch(&self, user_id: i32, files: Vec<UploadedFile>) -> IngestReport {
        let mut report = IngestReport::default();
        for file in files {
            let original_name = file.original_name.clone();
            match self.ingest_one(user_id, file).await {
                Ok(image) => report.images.push(image),
                Err(e) => {
                    error!(user_id, file = %original_name, error = %e, "Failed to ingest file.");
                    report.failed += 1;
                }
            }
        }
        info!(
            user_id,
            processed = report.processed(),
            failed = report.failed,
            "Upload batch finished."
        );
        report
    }

    pub async fn ingest_one(
        &self,
        user_id: i32,
        file: UploadedFile,
    ) -> Result<image::Model, IngestError> {
        if file.bytes.is_empty() {
            return Err(IngestError::EmptyFile(file.original_name));
        }

        let stored_name = self.store.allocate_name(user_id, &file.original_name);
        let file_path = self.store.save_original(&stored_name, &file.bytes).await?;

        let metadata = extract_metadata(&file.bytes);

        let thumb_target = self.store.thumbnail_path(&stored_name);
        let thumbnail_path = match generate_thumbnail(&file_path, &thumb_target).await {
            Ok(path) => path,
            Err(e) => {
                warn!(file = %file.original_name, error = %e, "Thumbnail generation failed, using original.");
                file_path.clone()
            }
        };

        let new_image = NewImage {
            user_id,
            filename: file.original_name,
            file_path: path_string(&file_path),
            thumbnail_path: path_string(&thumbnail_path),
            camera_make: metadata.camera_make,
            camera_model: metadata.camera_model,
            resolution: metadata.resolution,
            taken_at: metadata.taken_at,
            latitude: metadata.latitude,
            longitude: metadata.longitude,
        };

        match image_service::create_image(&self.db, new_image).await {
            Ok(image) => Ok(image),
            Err(e) => {
                self.store.remove_file(&file_path).await;
                if thumbnail_path != file_path {
                    self.store.remove_file(&thumbnail_path).await;
                }
                Err(e.into())
            }
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
