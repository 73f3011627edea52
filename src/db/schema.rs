use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{image, image_tag, tag, user};

/// Creates any missing tables from the entity definitions.
///
/// Tables are created parents first so foreign keys resolve.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    info!("Ensuring database schema.");
    create_table(db, user::Entity).await?;
    create_table(db, image::Entity).await?;
    create_table(db, tag::Entity).await?;
    create_table(db, image_tag::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}
