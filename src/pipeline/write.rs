//! Markdown output: write the assembled document to disk.
//!
//! The document is written to a hidden temp file beside the target and then
//! renamed over it, so a reader never sees a half-written `.md` and a failed
//! write leaves any previous version in place.

use crate::error::Ocr2MdError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write `contents` to `path` as UTF-8, creating parent directories and
/// replacing any existing file.
pub async fn write_markdown(path: &Path, contents: &str) -> Result<(), Ocr2MdError> {
    let write_err = |source: std::io::Error| Ocr2MdError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = temp_path_for(path);
    if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// `dir/report.md` → `dir/.report.md.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.md".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}
