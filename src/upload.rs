//! Upload storage: validate, persist, and hand off to ingestion.

use std::path::{Path, PathBuf};

use tracing::warn;

use rag_chat_core::error::RagError;
use rag_chat_core::loader::{validate_file_extension, validate_file_size};

use crate::config::UploadConfig;

/// Reduce a client-supplied filename to a safe base name.
///
/// Directory components are stripped and characters outside
/// `[A-Za-z0-9._ -]` are replaced with `_`. Returns `None` if nothing
/// usable remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// The rejection message for a disallowed extension.
pub fn unsupported_message(config: &UploadConfig) -> String {
    format!(
        "File type not supported. Allowed: {}",
        config.allowed_extensions.join(", ")
    )
}

/// Validate and write an upload to the configured directory.
///
/// Returns the stored path. Re-uploading a name overwrites the stored file.
/// The size limit is advisory: oversized files are logged and still stored.
pub async fn store_upload(
    config: &UploadConfig,
    filename: &str,
    bytes: &[u8],
) -> Result<PathBuf, RagError> {
    let name = sanitize_filename(filename).ok_or_else(|| RagError::UnsupportedFormat {
        extension: String::new(),
    })?;
    if !validate_file_extension(&name, &config.allowed_extensions) {
        return Err(RagError::UnsupportedFormat {
            extension: rag_chat_core::loader::file_extension(&name),
        });
    }

    if !validate_file_size(bytes.len() as u64, config.max_file_size_mb) {
        warn!(
            filename = %name,
            size_bytes = bytes.len(),
            limit_mb = config.max_file_size_mb,
            "upload exceeds configured size limit (not enforced)"
        );
    }

    let path = config.directory.join(&name);
    write_file(&config.directory, &path, bytes)
        .await
        .map_err(|e| RagError::Load(format!("failed to store {}: {}", name, e)))?;
    Ok(path)
}

async fn write_file(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, bytes).await
}
