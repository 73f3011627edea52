//! SeaORM entities for the photo library.
//!
//! Each entity lives in its own module; the prelude re-exports them under
//! short names for service code.

pub mod image;
pub mod image_tag;
pub mod tag;
pub mod user;

pub mod prelude {
    pub use super::user::ActiveModel as UserActiveModel;
    pub use super::user::Column as UserColumn;
    pub use super::user::Entity as User;
    pub use super::user::Model as UserModel;

    pub use super::image::ActiveModel as ImageActiveModel;
    pub use super::image::Column as ImageColumn;
    pub use super::image::Entity as Image;
    pub use super::image::Model as ImageModel;

    pub use super::tag::ActiveModel as TagActiveModel;
    pub use super::tag::Column as TagColumn;
    pub use super::tag::Entity as Tag;
    pub use super::tag::Model as TagModel;

    pub use super::image_tag::ActiveModel as ImageTagActiveModel;
    pub use super::image_tag::Column as ImageTagColumn;
    pub use super::image_tag::Entity as ImageTag;
    pub use super::image_tag::Model as ImageTagModel;
}
