//! Sequential multi-file conversion.
//!
//! Files are converted one after another, never concurrently, with an
//! optional pause between them to stay under provider rate limits. Each
//! file runs the full single-document pipeline on its own: a failure is
//! recorded in the [`BatchReport`] and the next file proceeds.

use crate::config::ConversionConfig;
use crate::convert::convert;
use crate::error::Ocr2MdError;
use crate::pipeline::input;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// File name of the summary written by [`BatchReport::write_summary`].
pub const SUMMARY_FILE_NAME: &str = "BATCH_SUMMARY.md";

/// Outcome of one file in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub source: PathBuf,
    /// Written Markdown file, on success.
    pub output: Option<PathBuf>,
    pub pages: usize,
    pub images: usize,
    pub duration_ms: u64,
    /// Display form of the error, on failure.
    pub error: Option<String>,
    /// Process exit code the error maps to; 0 on success.
    pub exit_code: i32,
}

impl BatchEntry {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn display_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Results of a whole batch, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub fn successful(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| e.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| !e.is_success())
    }

    pub fn total_pages(&self) -> usize {
        self.successful().map(|e| e.pages).sum()
    }

    pub fn total_images(&self) -> usize {
        self.successful().map(|e| e.images).sum()
    }

    /// Exit code of the first failed file, or 0 when every file converted.
    pub fn exit_code(&self) -> i32 {
        self.failed().map(|e| e.exit_code).next().unwrap_or(0)
    }

    /// Render the batch summary as Markdown.
    pub fn to_markdown(&self) -> String {
        let ok = self.successful().count();
        let mut md = String::from("# Batch OCR Processing Summary\n\n");
        let _ = writeln!(md, "**Date:** {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(md, "**Total Time:** {:.1} seconds", self.total_duration_ms as f64 / 1000.0);
        let _ = writeln!(md, "**Files Processed:** {}/{}", ok, self.entries.len());
        let _ = writeln!(md, "**Total Pages:** {}", self.total_pages());
        let _ = writeln!(md, "**Total Images:** {}\n", self.total_images());

        md.push_str("## Successful Extractions\n\n");
        for e in self.successful() {
            let _ = writeln!(
                md,
                "- **{}**: {} pages, {} images ({:.1}s)",
                e.display_name(),
                e.pages,
                e.images,
                e.duration_ms as f64 / 1000.0
            );
        }

        if self.failed().next().is_some() {
            md.push_str("\n## Failed Extractions\n\n");
            for e in self.failed() {
                let _ = writeln!(
                    md,
                    "- **{}**: {}",
                    e.display_name(),
                    e.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        md
    }

    /// Write [`SUMMARY_FILE_NAME`] into `dir` and return its path.
    pub async fn write_summary(&self, dir: &Path) -> Result<PathBuf, Ocr2MdError> {
        let path = dir.join(SUMMARY_FILE_NAME);
        crate::pipeline::write::write_markdown(&path, &self.to_markdown()).await?;
        Ok(path)
    }
}

/// Convert `sources` one at a time.
///
/// `output_dir`, when given, is created up front and receives every
/// `<stem>.md`; otherwise each Markdown file lands beside its PDF.
/// `delay` is slept between files, not after the last one.
///
/// A file whose Markdown would land on the output of an earlier successful
/// file in the same batch (two `report.pdf` from different folders into one
/// `output_dir`) is not converted and is recorded as
/// [`Ocr2MdError::InvalidInput`].
pub async fn convert_batch(
    sources: &[PathBuf],
    output_dir: Option<&Path>,
    delay: Duration,
    config: &ConversionConfig,
) -> Result<BatchReport, Ocr2MdError> {
    if let Some(dir) = output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Ocr2MdError::Write {
                path: dir.to_path_buf(),
                source: e,
            })?;
    }

    info!("Batch processing {} PDF files", sources.len());
    let batch_start = Instant::now();
    let mut entries = Vec::with_capacity(sources.len());
    // Output path → source that produced it.
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

    for (i, source) in sources.iter().enumerate() {
        info!("Progress: {}/{}: {}", i + 1, sources.len(), source.display());
        let start = Instant::now();

        let planned = input::output_path_for(source, output_dir);
        let planned = std::path::absolute(&planned).unwrap_or(planned);
        let result = match claimed.get(&planned) {
            Some(first) => Err(Ocr2MdError::invalid_input(
                source,
                format!(
                    "output {} is already written by {}",
                    planned.display(),
                    first.display()
                ),
            )),
            None => convert(source, output_dir, config).await,
        };

        let entry = match result {
            Ok(out) => BatchEntry {
                source: source.clone(),
                output: Some(out.request.output_path().to_path_buf()),
                pages: out.stats.page_count,
                images: out.stats.images_saved,
                duration_ms: start.elapsed().as_millis() as u64,
                error: None,
                exit_code: 0,
            },
            Err(e) => {
                warn!("Failed to process {}: {}", source.display(), e);
                BatchEntry {
                    source: source.clone(),
                    output: None,
                    pages: 0,
                    images: 0,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                    exit_code: e.exit_code(),
                }
            }
        };
        if entry.is_success() {
            claimed.insert(planned, source.clone());
        }
        entries.push(entry);

        if i + 1 < sources.len() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    let report = BatchReport {
        entries,
        total_duration_ms: batch_start.elapsed().as_millis() as u64,
    };
    info!(
        "Batch complete: {}/{} files, {} pages, {} images",
        report.successful().count(),
        report.entries.len(),
        report.total_pages(),
        report.total_images()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, error: Option<&str>, exit_code: i32) -> BatchEntry {
        BatchEntry {
            source: PathBuf::from(format!("/in/{name}")),
            output: error.is_none().then(|| PathBuf::from(format!("/out/{name}.md"))),
            pages: if error.is_none() { 3 } else { 0 },
            images: if error.is_none() { 2 } else { 0 },
            duration_ms: 1500,
            error: error.map(str::to_string),
            exit_code,
        }
    }

    #[test]
    fn totals_count_only_successes() {
        let report = BatchReport {
            entries: vec![
                entry("a.pdf", None, 0),
                entry("b.pdf", Some("OCR service error (HTTP 500): boom"), 5),
                entry("c.pdf", None, 0),
            ],
            total_duration_ms: 4000,
        };
        assert_eq!(report.successful().count(), 2);
        assert_eq!(report.total_pages(), 6);
        assert_eq!(report.total_images(), 4);
        assert_eq!(report.exit_code(), 5);
    }

    #[test]
    fn summary_markdown_lists_successes_and_failures() {
        let report = BatchReport {
            entries: vec![entry("a.pdf", None, 0), entry("b.pdf", Some("bad"), 3)],
            total_duration_ms: 2500,
        };
        let md = report.to_markdown();
        assert!(md.starts_with("# Batch OCR Processing Summary\n\n"));
        assert!(md.contains("**Total Time:** 2.5 seconds"));
        assert!(md.contains("**Files Processed:** 1/2"));
        assert!(md.contains("- **a.pdf**: 3 pages, 2 images (1.5s)"));
        assert!(md.contains("## Failed Extractions\n\n- **b.pdf**: bad"));
    }

    #[test]
    fn all_successful_has_no_failure_section() {
        let report = BatchReport {
            entries: vec![entry("a.pdf", None, 0)],
            total_duration_ms: 10,
        };
        assert!(!report.to_markdown().contains("Failed"));
        assert_eq!(report.exit_code(), 0);
    }
}
