use std::path::Path;

use axum::extract::Multipart;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, ScanError};
use crate::models::UploadedImage;

/// Persist the multipart field named `field_name` into `dir`.
///
/// The stored name is `<uuid><original extension>`, so concurrent uploads of
/// the same file never collide. Returns `None` when the field is absent or
/// empty; the pipeline turns that into its "no file" error.
pub async fn save_upload(
    dir: &Path,
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<Option<UploadedImage>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ScanError::BadInput(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ScanError::BadInput(format!("Failed to read upload: {e}")))?;

        if bytes.is_empty() {
            return Ok(None);
        }

        let path = dir.join(format!("{}{}", Uuid::new_v4(), extension_of(&original_name)));
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            ScanError::Io(format!("Failed to store upload {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), original_name = %original_name, size = bytes.len(), "Upload stored");
        return Ok(Some(UploadedImage::new(path, original_name)));
    }

    Ok(None)
}

/// Lowercased `.ext` of a client file name, or empty if it has none worth keeping.
fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}
