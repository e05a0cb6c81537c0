//! Input acquisition: turn a user-supplied path into a [`ConversionRequest`].
//!
//! Paths arrive two ways: as a CLI argument, or as the text a terminal pastes
//! when a file is dropped onto it. [`parse_drop_payload`] reduces the second
//! form to plain paths, after which both go through [`acquire`] and are
//! validated identically.
//!
//! Validation is synchronous and touches only the filesystem: existence,
//! `.pdf` extension (case-insensitive), regular file, readable, non-empty,
//! and the `%PDF` magic bytes.

use crate::error::Ocr2MdError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One file's conversion: where the PDF is and where the Markdown goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    source_path: PathBuf,
    output_path: PathBuf,
}

impl ConversionRequest {
    /// The validated source PDF.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Destination Markdown file.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// The source file name for display and for the provider request.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string())
    }
}

/// Validate `source` and build a request writing to `output`, or to a
/// sibling `.md` file when `output` is `None`.
///
/// When `output` is an existing directory the Markdown file is placed
/// inside it, named after the source.
pub fn acquire(
    source: impl AsRef<Path>,
    output: Option<&Path>,
) -> Result<ConversionRequest, Ocr2MdError> {
    let source_path = source.as_ref().to_path_buf();
    validate_pdf(&source_path)?;

    let output_path = output_path_for(&source_path, output);

    debug!(
        "Acquired {} → {}",
        source_path.display(),
        output_path.display()
    );
    Ok(ConversionRequest {
        source_path,
        output_path,
    })
}

/// Where [`acquire`] will put the Markdown for `source`: inside `output`
/// when it is an existing directory, at `output` otherwise, or beside the
/// source when `output` is `None`.
pub fn output_path_for(source: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(out) if out.is_dir() => out.join(markdown_file_name(source)),
        Some(out) => out.to_path_buf(),
        None => default_output_path(source),
    }
}

/// `report.pdf` → `report.md`, next to the source.
pub fn default_output_path(source: &Path) -> PathBuf {
    source.with_extension("md")
}

fn markdown_file_name(source: &Path) -> PathBuf {
    PathBuf::from(
        source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string()),
    )
    .with_extension("md")
}

/// Check that `path` is an existing, readable, non-empty PDF file.
fn validate_pdf(path: &Path) -> Result<(), Ocr2MdError> {
    if !path.exists() {
        return Err(Ocr2MdError::invalid_input(path, "file not found"));
    }

    if !has_pdf_extension(path) {
        return Err(Ocr2MdError::invalid_input(path, "expected a .pdf extension"));
    }

    let meta = std::fs::metadata(path)
        .map_err(|e| Ocr2MdError::invalid_input(path, e.to_string()))?;
    if !meta.is_file() {
        return Err(Ocr2MdError::invalid_input(path, "not a regular file"));
    }
    if meta.len() == 0 {
        return Err(Ocr2MdError::invalid_input(path, "file is empty"));
    }

    let mut f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Ocr2MdError::invalid_input(path, "permission denied"));
        }
        Err(e) => return Err(Ocr2MdError::invalid_input(path, e.to_string())),
    };

    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() {
        return Err(Ocr2MdError::invalid_input(path, "not a PDF (file too short)"));
    }
    if &magic != b"%PDF" {
        return Err(Ocr2MdError::invalid_input(
            path,
            format!("not a PDF (first bytes: {magic:?})"),
        ));
    }

    Ok(())
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

// ── Drop payloads ────────────────────────────────────────────────────────

/// Extract file paths from the text a terminal delivers for a drop.
///
/// Terminals differ: some paste `'/path/with spaces.pdf'`, some escape
/// (`/path/with\ spaces.pdf`), some send `file://` URIs, one per line.
/// A line that names an existing path verbatim is taken whole; otherwise it
/// is split shell-style on unquoted whitespace.
pub fn parse_drop_payload(payload: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for line in payload.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if Path::new(line).exists() {
            paths.push(PathBuf::from(line));
            continue;
        }
        for token in split_shell_words(line) {
            if let Some(p) = token_to_path(&token) {
                paths.push(p);
            }
        }
    }
    paths
}

fn token_to_path(token: &str) -> Option<PathBuf> {
    if token.is_empty() {
        return None;
    }
    if token.starts_with("file://") {
        return reqwest::Url::parse(token)
            .ok()
            .and_then(|u| u.to_file_path().ok());
    }
    Some(PathBuf::from(token))
}

/// Minimal POSIX-style word splitting: single quotes, double quotes and
/// backslash escapes. Backslash is literal on Windows, where it is the path
/// separator.
fn split_shell_words(line: &str) -> Vec<String> {
    let escapes = !cfg!(windows);
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' if escapes => {
                            if let Some(n) = chars.next() {
                                current.push(n);
                            }
                        }
                        _ => current.push(q),
                    }
                }
            }
            '\\' if escapes => {
                in_word = true;
                if let Some(n) = chars.next() {
                    current.push(n);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// A directory-safe name derived from a file's stem.
///
/// Keeps ASCII letters, digits, `-`, `_`, `.` and space; everything else
/// becomes `_`. Truncated to 50 characters and trimmed.
pub fn sanitize_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}
