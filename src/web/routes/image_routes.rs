use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ai::AiError;
use crate::db::services::{
    ImageFilter, ImageServiceError, image_query_service, image_service, tag_service,
};
use crate::ingest::UploadedFile;
use crate::services::analysis_service;
use crate::web::models::AuthenticatedUser;
use crate::web::models::image_models::{
    AddTagRequest, AnalyzeQuery, AnalyzeResponse, BatchDeleteRequest, BatchDeleteResponse,
    DeleteImageResponse, ImageListResponse, ImageResponse, ListImagesQuery, TagResponse,
    TaskQueuedResponse, UploadResponse,
};
use crate::web::{AppError, AppState};

const UPLOAD_FIELD: &str = "images";

// --- Route Handlers ---

async fn upload_images_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let user_id = authenticated_user.id;
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {e}")))?;
        files.push(UploadedFile { original_name, bytes });
    }

    if files.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "No files found in the '{UPLOAD_FIELD}' field."
        )));
    }

    let report = app_state.ingest.ingest_batch(user_id, files).await;

    if app_state.config.auto_tag_on_upload {
        if let Some(queue) = &app_state.tagging_queue {
            for image in &report.images {
                if let Err(e) = queue.enqueue(user_id, image) {
                    warn!(image_id = image.id, error = %e, "Skipping automatic tagging.");
                }
            }
        }
    }

    let processed = report.processed();
    Ok(Json(UploadResponse {
        message: format!("Uploaded {processed} images."),
        processed,
    }))
}

async fn list_images_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ListImagesQuery>,
) -> Result<Json<ImageListResponse>, AppError> {
    let month = params
        .month
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    if let Some(month) = &month {
        if image_query_service::month_range(month).is_none() {
            return Err(AppError::InvalidInput(format!(
                "Invalid month '{month}', expected YYYY-MM."
            )));
        }
    }

    let filter = ImageFilter {
        tags: params
            .tags
            .as_deref()
            .map(|tags| tags.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        month,
        camera: params.camera,
        keywords: Vec::new(),
    };
    let images =
        image_query_service::query_images(&app_state.db_pool, authenticated_user.id, &filter)
            .await?;
    Ok(Json(ImageListResponse::from(images)))
}

async fn get_image_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(image_id): Path<i32>,
) -> Result<Json<ImageResponse>, AppError> {
    let image =
        image_service::get_image_with_tags(&app_state.db_pool, image_id, authenticated_user.id)
            .await?;
    Ok(Json(image.into()))
}

async fn serve_stored_file(path: &str) -> Result<Response, AppError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        warn!(path, error = %e, "Stored file is not readable.");
        AppError::NotFound("File not found".to_string())
    })?;
    let mime = mime_guess::from_path(FsPath::new(path)).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], Body::from(bytes)).into_response())
}

async fn image_file_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(image_id): Path<i32>,
) -> Result<Response, AppError> {
    let image =
        image_service::get_image_for_user(&app_state.db_pool, image_id, authenticated_user.id)
            .await?;
    serve_stored_file(&image.file_path).await
}

async fn image_thumbnail_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(image_id): Path<i32>,
) -> Result<Response, AppError> {
    let image =
        image_service::get_image_for_user(&app_state.db_pool, image_id, authenticated_user.id)
            .await?;
    serve_stored_file(&image.thumbnail_path).await
}

async fn delete_image_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(image_id): Path<i32>,
) -> Result<Json<DeleteImageResponse>, AppError> {
    let image =
        image_service::get_image_for_user(&app_state.db_pool, image_id, authenticated_user.id)
            .await?;
    app_state.media_store.remove_image_files(&image).await;
    image_service::delete_image_record(&app_state.db_pool, image).await?;
    info!(image_id, user_id = authenticated_user.id, "Deleted image.");
    Ok(Json(DeleteImageResponse {
        message: "Image deleted.".to_string(),
        image_id,
    }))
}

async fn batch_delete_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<BatchDeleteRequest>,
) -> Result<Json<BatchDeleteResponse>, AppError> {
    if payload.ids.is_empty() {
        return Err(AppError::InvalidInput("No image ids given.".to_string()));
    }
    let mut response = BatchDeleteResponse {
        deleted: Vec::new(),
        not_found: Vec::new(),
    };
    for image_id in payload.ids {
        if response.deleted.contains(&image_id) || response.not_found.contains(&image_id) {
            continue;
        }
        match image_service::get_image_for_user(&app_state.db_pool, image_id, authenticated_user.id)
            .await
        {
            Ok(image) => {
                app_state.media_store.remove_image_files(&image).await;
                image_service::delete_image_record(&app_state.db_pool, image).await?;
                response.deleted.push(image_id);
            }
            Err(ImageServiceError::NotFound(_)) => response.not_found.push(image_id),
            Err(e) => return Err(e.into()),
        }
    }
    info!(
        user_id = authenticated_user.id,
        deleted = response.deleted.len(),
        not_found = response.not_found.len(),
        "Batch delete finished."
    );
    Ok(Json(response))
}

async fn add_tag_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(image_id): Path<i32>,
    Json(payload): Json<AddTagRequest>,
) -> Result<Json<ImageResponse>, AppError> {
    let db = &app_state.db_pool;
    let image = image_service::get_image_for_user(db, image_id, authenticated_user.id).await?;
    let tag = tag_service::find_or_create(db, &payload.name).await?;
    tag_service::attach(db, image.id, tag.id).await?;
    let image = image_service::get_image_with_tags(db, image_id, authenticated_user.id).await?;
    Ok(Json(image.into()))
}

async fn remove_tag_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path((image_id, tag_id)): Path<(i32, i32)>,
) -> Result<StatusCode, AppError> {
    let db = &app_state.db_pool;
    let image = image_service::get_image_for_user(db, image_id, authenticated_user.id).await?;
    tag_service::detach(db, image.id, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn analyze_image_handler(
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(image_id): Path<i32>,
    Query(params): Query<AnalyzeQuery>,
) -> Result<Response, AppError> {
    let db = &app_state.db_pool;
    let image = image_service::get_image_for_user(db, image_id, authenticated_user.id).await?;

    if params.run_async {
        let queue = app_state
            .tagging_queue
            .as_ref()
            .ok_or(AiError::NotConfigured)?;
        let task_id = queue.enqueue(authenticated_user.id, &image)?;
        let body = TaskQueuedResponse {
            message: "Image queued for analysis.".to_string(),
            task_id,
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let tagger = app_state
        .image_tagger
        .as_ref()
        .ok_or(AiError::NotConfigured)?;
    let added = analysis_service::analyze_and_tag(db, tagger, &image).await?;
    let image = image_service::get_image_with_tags(db, image_id, authenticated_user.id).await?;
    let body = AnalyzeResponse {
        message: format!("Added {} tags.", added.len()),
        tags: added.into_iter().map(TagResponse::from).collect(),
        image: image.into(),
    };
    Ok(Json(body).into_response())
}

pub fn create_images_router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/images",
            post(upload_images_handler)
                .layer(DefaultBodyLimit::max(max_upload_bytes))
                .get(list_images_handler),
        )
        .route("/images/batch/delete", post(batch_delete_handler))
        .route(
            "/images/{id}",
            get(get_image_handler).delete(delete_image_handler),
        )
        .route("/images/{id}/file", get(image_file_handler))
        .route("/images/{id}/thumbnail", get(image_thumbnail_handler))
        .route("/images/{id}/tags", post(add_tag_handler))
        .route("/images/{id}/tags/{tag_id}", delete(remove_tag_handler))
        .route("/images/{id}/analyze", post(analyze_image_handler))
}
