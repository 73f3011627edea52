//! The `services` module is the data-access layer of the photo library.
//! It encapsulates the queries behind users, images and tags so that HTTP
//! handlers, the ingestion pipeline and the tagging worker work with entity
//! models without knowing the underlying schema.
//!
//! Public items of each sub-module are re-exported here for access under
//! `crate::db::services::`.

pub mod image_query_service;
pub mod image_service;
pub mod tag_service;
pub mod user_service;

pub use image_query_service::*;
pub use image_service::*;
pub use tag_service::*;
pub use user_service::*;
