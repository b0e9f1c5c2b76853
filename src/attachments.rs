// ABOUTME: Turns the files of a local directory into attachment uploads
// ABOUTME: Regular files only, non-recursive, sorted by name, MIME type guessed from the extension

use anyhow::{Context, Result};
use convoy_core::FileUpload;
use std::path::Path;

/// Read every regular file directly inside `dir`
pub async fn collect(dir: &Path) -> Result<Vec<FileUpload>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read attachment directory {}", dir.display()))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?
    {
        let file_type = entry.file_type().await?;
        if file_type.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read attachment {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        tracing::debug!(file = %file_name, mime = %mime_type, size = data.len(), "Attachment read");
        uploads.push(FileUpload {
            file_name,
            mime_type,
            data,
        });
    }

    Ok(uploads)
}
