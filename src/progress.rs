//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to observe
//! each conversion as it moves through the pipeline. The CLI uses it to drive
//! a spinner; batch runs use it to print one line per file.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr2md::{ConversionProgressCallback, ConversionConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for PageCounter {
//!     fn on_ocr_complete(&self, _source: &Path, pages: usize, _elapsed_ms: u64) {
//!         self.pages.fetch_add(pages, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { pages: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{ConversionStats, SavedImage};
use std::path::Path;
use std::sync::Arc;

/// Called by the conversion pipeline at each stage.
///
/// Implementations must be `Send + Sync`: drop-zone conversions run as
/// independent tokio tasks and may report concurrently. All methods have
/// default no-op implementations so callers only override what they need.
pub trait ConversionProgressCallback: Send + Sync {
    /// The source was validated and the upload is about to start.
    fn on_conversion_start(&self, source: &Path) {
        let _ = source;
    }

    /// The provider answered successfully.
    fn on_ocr_complete(&self, source: &Path, pages: usize, elapsed_ms: u64) {
        let _ = (source, pages, elapsed_ms);
    }

    /// One figure was handled (successfully or not).
    fn on_image_saved(&self, source: &Path, image: &SavedImage) {
        let _ = (source, image);
    }

    /// The Markdown file was written.
    fn on_conversion_complete(&self, source: &Path, output: &Path, stats: &ConversionStats) {
        let _ = (source, output, stats);
    }

    /// The conversion failed; `error` is the display form of the error.
    fn on_conversion_error(&self, source: &Path, error: &str) {
        let _ = (source, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        pages: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_conversion_start(&self, _source: &Path) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_ocr_complete(&self, _source: &Path, pages: usize, _elapsed_ms: u64) {
            self.pages.fetch_add(pages, Ordering::SeqCst);
        }

        fn on_conversion_complete(&self, _source: &Path, _output: &Path, _stats: &ConversionStats) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_error(&self, _source: &Path, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let p = Path::new("a.pdf");
        cb.on_conversion_start(p);
        cb.on_ocr_complete(p, 3, 10);
        cb.on_conversion_complete(p, Path::new("a.md"), &ConversionStats::default());
        cb.on_conversion_error(p, "boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let p = Path::new("a.pdf");

        tracker.on_conversion_start(p);
        tracker.on_ocr_complete(p, 4, 1200);
        tracker.on_conversion_complete(p, Path::new("a.md"), &ConversionStats::default());
        tracker.on_conversion_start(p);
        tracker.on_conversion_error(p, "OCR service error (HTTP 500): boom");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 4);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_conversion_start(Path::new("x.pdf"));
    }
}
