use sea_orm::DbConn;
use std::path::Path;

use crate::ai::{AiError, ImageTagger};
use crate::db::entities::{image, tag};
use crate::db::services::{TagServiceError, tag_service};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("Failed to save tags: {0}")]
    Tags(#[from] TagServiceError),
}

/// Runs the vision model on a stored image and attaches the proposed tags.
/// Returns only the tags that were newly attached.
pub async fn analyze_and_tag(
    db: &DbConn,
    tagger: &ImageTagger,
    image: &image::Model,
) -> Result<Vec<tag::Model>, AnalysisError> {
    let names = tagger.analyze(Path::new(&image.file_path)).await?;
    Ok(tag_service::apply_ai_tags(db, image.id, &names).await?)
}
