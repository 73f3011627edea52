use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, LoaderTrait, ModelTrait,
    QueryFilter, Set,
};

use crate::db::entities::{image, image_tag, prelude::Image, tag};

#[derive(Debug, thiserror::Error)]
pub enum ImageServiceError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Image not found: {0}")]
    NotFound(i32),
}

/// Everything needed to insert one image record.
#[derive(Debug, Clone, Default)]
pub struct NewImage {
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
}

/// An image together with the tags attached to it, sorted by name.
#[derive(Debug, Clone)]
pub struct ImageWithTags {
    pub image: image::Model,
    pub tags: Vec<tag::Model>,
}

pub async fn create_image(db: &DbConn, new_image: NewImage) -> Result<image::Model, DbErr> {
    let now = Utc::now();
    let model = image::ActiveModel {
        user_id: Set(new_image.user_id),
        filename: Set(new_image.filename),
        file_path: Set(new_image.file_path),
        thumbnail_path: Set(new_image.thumbnail_path),
        camera_make: Set(new_image.camera_make),
        camera_model: Set(new_image.camera_model),
        resolution: Set(new_image.resolution),
        taken_at: Set(new_image.taken_at),
        latitude: Set(new_image.latitude),
        longitude: Set(new_image.longitude),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    model.insert(db).await
}

/// Fetches an image only if it belongs to `user_id`.
///
/// Images owned by someone else are reported exactly like missing ones.
pub async fn get_image_for_user(
    db: &DbConn,
    image_id: i32,
    user_id: i32,
) -> Result<image::Model, ImageServiceError> {
    Image::find_by_id(image_id)
        .filter(image::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(ImageServiceError::NotFound(image_id))
}

pub async fn get_image_with_tags(
    db: &DbConn,
    image_id: i32,
    user_id: i32,
) -> Result<ImageWithTags, ImageServiceError> {
    let image = get_image_for_user(db, image_id, user_id).await?;
    let mut loaded = load_tags(db, vec![image]).await?;
    loaded.pop().ok_or(ImageServiceError::NotFound(image_id))
}

/// Loads tags for a batch of images, preserving the input order.
pub async fn load_tags(
    db: &DbConn,
    images: Vec<image::Model>,
) -> Result<Vec<ImageWithTags>, DbErr> {
    if images.is_empty() {
        return Ok(Vec::new());
    }
    let tags = images
        .load_many_to_many(tag::Entity, image_tag::Entity, db)
        .await?;
    Ok(images
        .into_iter()
        .zip(tags)
        .map(|(image, mut tags)| {
            tags.sort_by(|a, b| a.name.cmp(&b.name));
            ImageWithTags { image, tags }
        })
        .collect())
}

/// Removes the image row and its tag associations.
///
/// Files on disk are not touched here.
pub async fn delete_image_record(db: &DbConn, image: image::Model) -> Result<(), DbErr> {
    image_tag::Entity::delete_many()
        .filter(image_tag::Column::ImageId.eq(image.id))
        .exec(db)
        .await?;
    image.delete(db).await?;
    Ok(())
}
