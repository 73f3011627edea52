use image::ImageFormat;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};

/// Thumbnails are always this wide; height follows the source aspect ratio.
pub const THUMBNAIL_WIDTH: u32 = 400;
/// Sources narrower than 1:10 are not thumbnailed.
pub const MAX_THUMBNAIL_HEIGHT: u32 = 4000;

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Image is too narrow for a thumbnail: {width}x{height}")]
    TooNarrow { width: u32, height: u32 },
    #[error("Thumbnail task failed: {0}")]
    Join(String),
}

/// Output encoding is chosen from the source file's extension.
fn output_format(src: &Path) -> Result<ImageFormat, ThumbnailError> {
    let ext = src
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        other => Err(ThumbnailError::UnsupportedFormat(other.to_string())),
    }
}

fn scaled_height(width: u32, height: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let scaled = (u64::from(height) * u64::from(THUMBNAIL_WIDTH) + u64::from(width) / 2) / u64::from(width);
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

/// Synchronous body of [`generate_thumbnail`].
pub fn render_thumbnail(src: &Path, dest: &Path) -> Result<PathBuf, ThumbnailError> {
    let format = output_format(src)?;
    let img = image::open(src)?;
    let height = scaled_height(img.width(), img.height());
    if height > MAX_THUMBNAIL_HEIGHT {
        return Err(ThumbnailError::TooNarrow {
            width: img.width(),
            height: img.height(),
        });
    }
    let thumbnail = img.resize_exact(THUMBNAIL_WIDTH, height, FilterType::Lanczos3);

    match format {
        // JPEG has no alpha channel.
        ImageFormat::Jpeg => thumbnail.to_rgb8().save_with_format(dest, format)?,
        _ => thumbnail.save_with_format(dest, format)?,
    }
    Ok(dest.to_path_buf())
}

/// Writes a 400px-wide thumbnail of `src` to `dest` on the blocking pool.
pub async fn generate_thumbnail(src: &Path, dest: &Path) -> Result<PathBuf, ThumbnailError> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || render_thumbnail(&src, &dest))
        .await
        .map_err(|e| ThumbnailError::Join(e.to_string()))?
}
