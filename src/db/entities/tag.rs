use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::TagSource;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    // Tag names are global, not per user.
    #[sea_orm(unique)]
    pub name: String,
    pub source: TagSource,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::image_tag::Entity")]
    ImageTags,
}

impl Related<super::image_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ImageTags.def()
    }
}

impl Related<super::image::Entity> for Entity {
    fn to() -> RelationDef {
        super::image_tag::Relation::Image.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::image_tag::Relation::Tag.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
