use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a tag came from. An AI pass may upgrade `User` to `Ai`, never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "tag_source_enum")]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "ai")]
    Ai,
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSource::User => write!(f, "user"),
            TagSource::Ai => write!(f, "ai"),
        }
    }
}
