use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::QueryCondition;
use crate::db::entities::tag;
use crate::db::enums::TagSource;
use crate::db::services::ImageWithTags;

// --- Responses ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagResponse {
    pub id: i32,
    pub name: String,
    pub source: TagSource,
}

impl From<tag::Model> for TagResponse {
    fn from(tag: tag::Model) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            source: tag.source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub id: i32,
    pub user_id: i32,
    pub filename: String,
    pub file_path: String,
    pub thumbnail_path: String,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub resolution: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<TagResponse>,
}

impl From<ImageWithTags> for ImageResponse {
    fn from(value: ImageWithTags) -> Self {
        let ImageWithTags { image, tags } = value;
        Self {
            id: image.id,
            user_id: image.user_id,
            filename: image.filename,
            file_path: image.file_path,
            thumbnail_path: image.thumbnail_path,
            camera_make: image.camera_make,
            camera_model: image.camera_model,
            resolution: image.resolution,
            taken_at: image.taken_at,
            latitude: image.latitude,
            longitude: image.longitude,
            created_at: image.created_at,
            updated_at: image.updated_at,
            tags: tags.into_iter().map(TagResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageListResponse {
    pub images: Vec<ImageResponse>,
    pub count: usize,
}

impl From<Vec<ImageWithTags>> for ImageListResponse {
    fn from(images: Vec<ImageWithTags>) -> Self {
        let images: Vec<ImageResponse> = images.into_iter().map(ImageResponse::from).collect();
        Self {
            count: images.len(),
            images,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub processed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteImageResponse {
    pub message: String,
    pub image_id: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchDeleteResponse {
    pub deleted: Vec<i32>,
    pub not_found: Vec<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub message: String,
    pub tags: Vec<TagResponse>,
    pub image: ImageResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskQueuedResponse {
    pub message: String,
    pub task_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagListResponse {
    pub tags: Vec<TagResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpQueryResponse {
    pub images: Vec<ImageResponse>,
    pub count: usize,
    pub condition: QueryCondition,
    pub message: String,
}

// --- Requests ---

#[derive(Debug, Default, Deserialize)]
pub struct ListImagesQuery {
    /// Comma-separated tag names.
    pub tags: Option<String>,
    pub month: Option<String>,
    pub camera: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddTagRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(rename = "async", default)]
    pub run_async: bool,
}

#[derive(Debug, Deserialize)]
pub struct McpQueryRequest {
    pub query: String,
}
