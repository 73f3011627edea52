use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, IntoActiveModel, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, SqlErr,
};
use tracing::{debug, info};

use crate::db::entities::{image, image_tag, prelude::Tag, tag};
use crate::db::enums::TagSource;

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Tag name must not be empty")]
    EmptyName,
}

// --- Tag Service Functions ---

/// Looks a tag up by exact name, creating it with `user` provenance when absent.
pub async fn find_or_create(db: &DbConn, name: &str) -> Result<tag::Model, TagServiceError> {
    find_or_create_with_source(db, name, TagSource::User).await
}

/// Like [`find_or_create`] for names proposed by the model: new tags are
/// created as `ai` and existing `user` tags are upgraded.
pub async fn find_or_create_ai(db: &DbConn, name: &str) -> Result<tag::Model, TagServiceError> {
    let tag = find_or_create_with_source(db, name, TagSource::Ai).await?;
    Ok(set_provenance_ai(db, tag).await?)
}

async fn find_or_create_with_source(
    db: &DbConn,
    name: &str,
    source: TagSource,
) -> Result<tag::Model, TagServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagServiceError::EmptyName);
    }

    if let Some(existing) = find_by_name(db, name).await? {
        return Ok(existing);
    }

    let new_tag = tag::ActiveModel {
        name: Set(name.to_string()),
        source: Set(source),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    match new_tag.insert(db).await {
        Ok(created) => {
            debug!(tag = %created.name, source = %created.source, "Created tag.");
            Ok(created)
        }
        // Someone else created the same name between our lookup and insert.
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            find_by_name(db, name).await?.ok_or(TagServiceError::DbErr(e))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn find_by_name(db: &DbConn, name: &str) -> Result<Option<tag::Model>, DbErr> {
    Tag::find().filter(tag::Column::Name.eq(name)).one(db).await
}

/// Associates a tag with an image. Returns `false` when the pair already existed.
pub async fn attach(db: &DbConn, image_id: i32, tag_id: i32) -> Result<bool, DbErr> {
    let existing = image_tag::Entity::find_by_id((image_id, tag_id)).one(db).await?;
    if existing.is_some() {
        return Ok(false);
    }

    let link = image_tag::ActiveModel {
        image_id: Set(image_id),
        tag_id: Set(tag_id),
    };
    match image_tag::Entity::insert(link).exec_without_returning(db).await {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Upgrades a tag's provenance to `ai`. Already-`ai` tags are returned unchanged.
pub async fn set_provenance_ai(db: &DbConn, tag: tag::Model) -> Result<tag::Model, DbErr> {
    if tag.source == TagSource::Ai {
        return Ok(tag);
    }
    let mut active = tag.into_active_model();
    active.source = Set(TagSource::Ai);
    active.update(db).await
}

/// Removes a tag from an image. Removing a missing association is not an error.
pub async fn detach(db: &DbConn, image_id: i32, tag_id: i32) -> Result<u64, DbErr> {
    let result = image_tag::Entity::delete_many()
        .filter(image_tag::Column::ImageId.eq(image_id))
        .filter(image_tag::Column::TagId.eq(tag_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Distinct tags attached to at least one of the user's images, ordered by name.
pub async fn list_used_tags(db: &DbConn, user_id: i32) -> Result<Vec<tag::Model>, DbErr> {
    Tag::find()
        .join(JoinType::InnerJoin, tag::Relation::ImageTags.def())
        .join(JoinType::InnerJoin, image_tag::Relation::Image.def())
        .filter(image::Column::UserId.eq(user_id))
        .distinct()
        .order_by_asc(tag::Column::Name)
        .all(db)
        .await
}

/// The user's tag vocabulary as plain names.
pub async fn used_tag_names(db: &DbConn, user_id: i32) -> Result<Vec<String>, DbErr> {
    Ok(list_used_tags(db, user_id)
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect())
}

/// Writes tags proposed by the model onto an image and returns the ones that
/// were newly attached.
pub async fn apply_ai_tags(
    db: &DbConn,
    image_id: i32,
    names: &[String],
) -> Result<Vec<tag::Model>, TagServiceError> {
    let mut added = Vec::new();
    for name in names {
        let tag = match find_or_create_ai(db, name).await {
            Ok(tag) => tag,
            Err(TagServiceError::EmptyName) => continue,
            Err(e) => return Err(e),
        };
        if attach(db, image_id, tag.id).await? {
            added.push(tag);
        }
    }
    info!(image_id, added = added.len(), proposed = names.len(), "Applied AI tags.");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::{image_service, user_service};
    use crate::db::test_support::memory_db;

    async fn seed_image(db: &DbConn, username: &str) -> image::Model {
        let user = user_service::create_user(
            db,
            username.into(),
            format!("{username}@example.com"),
            "hash".into(),
        )
        .await
        .unwrap();
        image_service::create_image(
            db,
            image_service::NewImage {
                user_id: user.id,
                filename: "photo.jpg".into(),
                file_path: "uploads/images/photo.jpg".into(),
                thumbnail_path: "uploads/thumbnails/photo.jpg".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent_and_user_sourced() {
        let db = memory_db().await;
        let first = find_or_create(&db, "  beach ").await.unwrap();
        let second = find_or_create(&db, "beach").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "beach");
        assert_eq!(first.source, TagSource::User);
        assert!(matches!(
            find_or_create(&db, "   ").await,
            Err(TagServiceError::EmptyName)
        ));
    }

    #[tokio::test]
    async fn test_attach_twice_leaves_one_row() {
        let db = memory_db().await;
        let image = seed_image(&db, "alice").await;
        let tag = find_or_create(&db, "sunset").await.unwrap();

        assert!(attach(&db, image.id, tag.id).await.unwrap());
        assert!(!attach(&db, image.id, tag.id).await.unwrap());

        let rows = image_tag::Entity::find()
            .filter(image_tag::Column::ImageId.eq(image.id))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_provenance_only_upgrades() {
        let db = memory_db().await;
        let user_tag = find_or_create(&db, "dog").await.unwrap();
        let upgraded = set_provenance_ai(&db, user_tag).await.unwrap();
        assert_eq!(upgraded.source, TagSource::Ai);

        // A later manual attach must not downgrade it.
        let again = find_or_create(&db, "dog").await.unwrap();
        assert_eq!(again.source, TagSource::Ai);

        let fresh = find_or_create_ai(&db, "cat").await.unwrap();
        assert_eq!(fresh.source, TagSource::Ai);
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let db = memory_db().await;
        let image = seed_image(&db, "alice").await;
        let tag = find_or_create(&db, "tree").await.unwrap();
        attach(&db, image.id, tag.id).await.unwrap();

        assert_eq!(detach(&db, image.id, tag.id).await.unwrap(), 1);
        assert_eq!(detach(&db, image.id, tag.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_used_tags_are_scoped_and_sorted() {
        let db = memory_db().await;
        let alice_image = seed_image(&db, "alice").await;
        let bob_image = seed_image(&db, "bobby").await;

        for name in ["zebra", "apple"] {
            let tag = find_or_create(&db, name).await.unwrap();
            attach(&db, alice_image.id, tag.id).await.unwrap();
        }
        let shared = find_or_create(&db, "apple").await.unwrap();
        attach(&db, bob_image.id, shared.id).await.unwrap();
        let bob_only = find_or_create(&db, "mango").await.unwrap();
        attach(&db, bob_image.id, bob_only.id).await.unwrap();
        // Unattached tags never show up.
        find_or_create(&db, "orphan").await.unwrap();

        assert_eq!(
            used_tag_names(&db, alice_image.user_id).await.unwrap(),
            vec!["apple".to_string(), "zebra".to_string()]
        );
        assert_eq!(
            used_tag_names(&db, bob_image.user_id).await.unwrap(),
            vec!["apple".to_string(), "mango".to_string()]
        );
    }

    #[tokio::test]
    async fn test_apply_ai_tags_reports_only_new_links() {
        let db = memory_db().await;
        let image = seed_image(&db, "alice").await;
        let existing = find_or_create(&db, "beach").await.unwrap();
        attach(&db, image.id, existing.id).await.unwrap();

        let names = vec!["beach".to_string(), "sea".to_string(), " ".to_string()];
        let added = apply_ai_tags(&db, image.id, &names).await.unwrap();

        let added_names: Vec<_> = added.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(added_names, vec!["sea"]);
        let beach = find_by_name(&db, "beach").await.unwrap().unwrap();
        assert_eq!(beach.source, TagSource::Ai);
    }
}
