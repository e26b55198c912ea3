//! Media normalization.
//!
//! Turns inbound payloads into [`TurnPart`]s:
//! - base64 images (optionally data-URI prefixed) from JSON chat requests
//! - multipart uploads, which are either opened as images or handed to the
//!   model client's file upload
//!
//! Uploads are checked against a fixed extension allow-list first.

use crate::provider::{ModelClient, TurnPart};
use base64::Engine;
use gemchat_common::{Error, Result};
use image::{ImageFormat, ImageReader};
use serde::Serialize;
use std::io::Cursor;

pub const IMAGE_FORMATS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff"];

pub const DOCUMENT_FORMATS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "rtf", "csv", "tsv", "html", "htm",
];

pub const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "aiff", "aac", "ogg", "flac", "m4a", "wma"];

pub const VIDEO_FORMATS: &[&str] = &[
    "mp4", "mov", "avi", "flv", "mpg", "mpeg", "wmv", "webm", "mkv", "3gp",
];

/// Listing served by `/api/supported-formats`.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedFormats {
    pub image_formats: &'static [&'static str],
    pub document_formats: &'static [&'static str],
    pub audio_formats: &'static [&'static str],
    pub video_formats: &'static [&'static str],
    pub max_file_size: String,
}

/// Build the supported-format listing for a given upload limit.
pub fn supported_formats(max_content_length: usize) -> SupportedFormats {
    SupportedFormats {
        image_formats: IMAGE_FORMATS,
        document_formats: DOCUMENT_FORMATS,
        audio_formats: AUDIO_FORMATS,
        video_formats: VIDEO_FORMATS,
        max_file_size: gemchat_common::util::format_megabytes(max_content_length),
    }
}

/// Lowercase extension after the last dot, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
}

/// Whether `filename` has an allow-listed extension.
pub fn is_allowed_file(filename: &str) -> bool {
    file_extension(filename).is_some_and(|ext| {
        [IMAGE_FORMATS, DOCUMENT_FORMATS, AUDIO_FORMATS, VIDEO_FORMATS]
            .iter()
            .any(|formats| formats.contains(&ext.as_str()))
    })
}

/// Reduce an uploaded filename to a safe basename.
///
/// Drops any directory part and every character outside `[A-Za-z0-9._-]`
/// (whitespace becomes `_`), then strips leading dots and underscores.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();

    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// Standard extension → MIME table.
#[allow(clippy::match_same_arms)]
fn standard_mime_type(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "html" | "htm" => "text/html",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "aiff" => "audio/x-aiff",
        "aac" => "audio/aac",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mpg" | "mpeg" => "video/mpeg",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime)
}

/// Fallback table consulted when the standard table has no entry.
#[allow(clippy::match_same_arms)]
fn fallback_mime_type(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// MIME type for a filename: standard table first, then the fallback table.
pub fn mime_type_for(filename: &str) -> &'static str {
    let ext = file_extension(filename).unwrap_or_default();
    standard_mime_type(&ext).unwrap_or_else(|| fallback_mime_type(&ext))
}

/// Open `bytes` as an image and return it as an inline image part.
///
/// PNG, JPEG and WEBP pass through unchanged; other decodable formats are
/// re-encoded as PNG.
pub fn open_image(bytes: Vec<u8>) -> Result<TurnPart> {
    let reader = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| Error::InvalidMedia(format!("cannot read image: {e}")))?;

    let format = reader
        .format()
        .ok_or_else(|| Error::InvalidMedia("cannot identify image file".into()))?;

    let image = reader
        .decode()
        .map_err(|e| Error::InvalidMedia(format!("cannot decode image: {e}")))?;

    match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP => Ok(TurnPart::Image {
            mime_type: format.to_mime_type().to_string(),
            data: bytes,
        }),
        other => {
            let mut data = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
                .map_err(|e| Error::InvalidMedia(format!("cannot convert {other:?} image: {e}")))?;
            Ok(TurnPart::Image {
                mime_type: "image/png".into(),
                data,
            })
        }
    }
}

/// Decode a base64 image, optionally prefixed with `data:image/...;base64,`.
///
/// For a data URI only the segment after the first comma, up to any further
/// comma, is decoded.
pub fn decode_base64_image(encoded: &str) -> Result<TurnPart> {
    let payload = if encoded.starts_with("data:image") {
        encoded
            .split(',')
            .nth(1)
            .ok_or_else(|| Error::InvalidMedia("data URI has no payload".into()))?
    } else {
        encoded
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::InvalidMedia(format!("invalid base64 data: {e}")))?;

    open_image(bytes)
}

/// Normalize an uploaded file into a turn part.
///
/// Images are opened locally; everything else goes through the client's file
/// upload. The extension must already have passed [`is_allowed_file`].
pub async fn normalize_upload(
    filename: &str,
    bytes: Vec<u8>,
    client: &dyn ModelClient,
) -> Result<TurnPart> {
    let filename = sanitize_filename(filename);
    let mime_type = mime_type_for(&filename);

    tracing::info!(filename = %filename, mime_type = %mime_type, size = bytes.len(), "Processing file");

    if mime_type.starts_with("image/") {
        return open_image(bytes);
    }

    let file = client
        .upload_file(bytes, mime_type, &filename)
        .await
        .map_err(|e| Error::UploadFailed(e.message))?;

    Ok(TurnPart::File(file))
}
