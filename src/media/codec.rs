// src/media/codec.rs
//
// Image format detection, thumbnailing and normalization
//
// All functions are CPU-bound and synchronous; async callers run them
// on the blocking pool.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::error::{AppError, AppResult};

/// Extensions tried by `load`, in order
///
/// The encoding of a stored file is not tracked anywhere but in its name.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "heic", "webp", "gif"];

/// Quality of JPEG thumbnails (full images keep their own encoding)
const THUMBNAIL_JPEG_QUALITY: u8 = 85;

/// Extension a blob will be stored under
pub fn detect_extension(bytes: &[u8]) -> AppResult<&'static str> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => Ok("jpg"),
        Ok(ImageFormat::Png) => Ok("png"),
        Ok(ImageFormat::WebP) => Ok("webp"),
        Ok(ImageFormat::Gif) => Ok("gif"),
        Ok(other) => Err(AppError::ConversionFailure(format!(
            "Unsupported image format: {:?}",
            other
        ))),
        Err(e) => Err(AppError::ConversionFailure(e.to_string())),
    }
}

fn format_for_extension(extension: &str) -> AppResult<ImageFormat> {
    match extension {
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "png" => Ok(ImageFormat::Png),
        "webp" => Ok(ImageFormat::WebP),
        "gif" => Ok(ImageFormat::Gif),
        other => Err(AppError::ConversionFailure(format!(
            "No encoder for .{}",
            other
        ))),
    }
}

fn decode(bytes: &[u8]) -> AppResult<DynamicImage> {
    // Animated formats decode to their first frame
    Ok(image::load_from_memory(bytes)?)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> AppResult<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    // JPEG carries no alpha channel
    image.to_rgb8().write_with_encoder(encoder)?;
    Ok(out)
}

fn encode(image: &DynamicImage, format: ImageFormat, jpeg_quality: u8) -> AppResult<Vec<u8>> {
    if format == ImageFormat::Jpeg {
        return encode_jpeg(image, jpeg_quality);
    }

    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut cursor, format)?;
    Ok(cursor.into_inner())
}

/// Build a thumbnail no larger than `max_dimension` on its longer side
///
/// Decodes once and uses the fast integer thumbnail filter instead of a full
/// resample. Images already within bounds are re-encoded at their own size.
/// The thumbnail keeps the source's format so it can share its extension.
pub fn make_thumbnail(bytes: &[u8], extension: &str, max_dimension: u32) -> AppResult<Vec<u8>> {
    let format = format_for_extension(extension)?;
    let image = decode(bytes)?;

    let thumbnail = if image.width() > max_dimension || image.height() > max_dimension {
        image.thumbnail(max_dimension, max_dimension)
    } else {
        image
    };

    if thumbnail.width() == 0 || thumbnail.height() == 0 {
        return Err(AppError::ConversionFailure(
            "Thumbnail has no pixels".to_string(),
        ));
    }

    encode(&thumbnail, format, THUMBNAIL_JPEG_QUALITY)
}

/// Re-encode any supported image as a static JPEG at `quality`
pub fn normalize(bytes: &[u8], quality: u8) -> AppResult<Vec<u8>> {
    let image = decode(bytes)?;
    encode_jpeg(&image, quality)
}
