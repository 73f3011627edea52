pub mod metadata;
pub mod storage;
pub mod thumbnail;

pub use metadata::{ImageMetadata, extract_metadata};
pub use storage::{MediaStore, StorageError};
pub use thumbnail::{THUMBNAIL_WIDTH, ThumbnailError, generate_thumbnail};
