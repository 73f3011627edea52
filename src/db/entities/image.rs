use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "images")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    /// Name the file had on the uploader's machine.
    pub filename: String,
    pub file_path: String,
    /// Equals `file_path` when no thumbnail could be produced.
    pub thumbnail_path: String,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub resolution: Option<String>,
    pub taken_at: Option<ChronoDateTimeUtc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::image_tag::Entity")]
    ImageTags,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::image_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ImageTags.def()
    }
}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        super::image_tag::Relation::Tag.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::image_tag::Relation::Image.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
