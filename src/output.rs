//! Result types returned by a conversion.

use crate::pipeline::input::ConversionRequest;
use crate::pipeline::ocr::OcrPage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything produced by one successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The request that was converted.
    pub request: ConversionRequest,
    /// The assembled Markdown document, exactly as written to disk.
    pub markdown: String,
    /// Per-page results from the provider, with figure references already
    /// rewritten when figure extraction was enabled.
    pub pages: Vec<OcrPage>,
    /// Figures written alongside the Markdown file.
    pub images: Vec<SavedImage>,
    /// Timing and size figures.
    pub stats: ConversionStats,
}

/// Aggregate statistics for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages returned by the provider.
    pub page_count: usize,
    /// Figures decoded and written in the requested format.
    pub images_saved: usize,
    /// Figures that fell back to raw bytes or could not be written.
    pub images_failed: usize,
    /// Size of the uploaded PDF in bytes.
    pub doc_size_bytes: u64,
    /// Wall-clock time of the OCR request.
    pub ocr_duration_ms: u64,
    /// Wall-clock time of the whole conversion.
    pub total_duration_ms: u64,
}

/// The outcome of writing one embedded figure to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedImage {
    /// Provider page index the figure belongs to.
    pub page_index: usize,
    /// 1-based position of the figure on its page.
    pub image_index: usize,
    /// Provider-assigned id, e.g. `img-0.jpeg`.
    pub id: Option<String>,
    /// Where the bytes were written, if anywhere.
    pub path: Option<PathBuf>,
    /// File extension actually used (`jpg`, `png`, `gif`, `bin`).
    pub format: Option<String>,
    /// Pixel dimensions when the figure decoded successfully.
    pub dimensions: Option<(u32, u32)>,
    /// Why the figure could not be saved in the requested format.
    pub error: Option<String>,
}

impl SavedImage {
    /// True when the figure was decoded and written in the requested format.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.path.is_some()
    }
}
