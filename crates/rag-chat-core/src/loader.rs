//! Document loader trait and upload extension checks.

use std::path::Path;

use async_trait::async_trait;

use crate::error::RagError;

/// Extensions accepted for upload and ingestion.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = [".pdf", ".txt", ".docx", ".doc"];

/// Reads the raw text of a stored document.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the plain text of the file at `path`.
    ///
    /// Fails with [`RagError::UnsupportedFormat`] for extensions the loader
    /// does not handle, and with [`RagError::Load`] when the file cannot be
    /// read or parsed.
    async fn load(&self, path: &Path) -> Result<String, RagError>;
}

/// The lower-cased extension of `filename`, including the leading dot.
///
/// Returns an empty string when the name has no extension.
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Whether `filename`'s extension is in `allowed` (compared case-insensitively).
pub fn validate_file_extension(filename: &str, allowed: &[String]) -> bool {
    let ext = file_extension(filename);
    !ext.is_empty() && allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))
}

/// Whether `size_bytes` fits within `max_size_mb` megabytes.
pub fn validate_file_size(size_bytes: u64, max_size_mb: u64) -> bool {
    size_bytes <= max_size_mb.saturating_mul(1024 * 1024)
}
