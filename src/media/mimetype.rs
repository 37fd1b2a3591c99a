use std::path::Path;
use anyhow::{Result, Context};

/// MIME type sniffed from the file's leading bytes.
pub fn detect_mimetype(path: &Path) -> Result<String> {
    let kind = infer::get_from_path(path)
        .context("Failed to read file for mimetype detection")?;

    match kind {
        Some(k) => Ok(k.mime_type().to_string()),
        None => Ok("application/octet-stream".to_string()),
    }
}

/// True when the content, not just the extension, is an image.
pub fn is_image_content(path: &Path) -> Result<bool> {
    Ok(detect_mimetype(path)?.starts_with("image/"))
}
