//! # edgequake-ocr2md
//!
//! Convert PDF documents to Markdown with a hosted OCR service.
//!
//! The crate is a thin client: it validates a local PDF, uploads it to the
//! Mistral OCR endpoint in one request, and writes the returned Markdown to a
//! `.md` file beside the PDF (or wherever the caller points it). All document
//! understanding happens on the provider side.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF path (CLI argument or drop event)
//!  │
//!  ├─ 1. Input    validate the file, derive the output path
//!  ├─ 2. OCR      POST the PDF to /v1/ocr, parse per-page Markdown
//!  ├─ 3. Figures  optional: decode embedded images, rewrite links
//!  └─ 4. Write    assemble pages, write <stem>.md atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .api_key(std::env::var("MISTRAL_API_KEY")?)
//!         .build()?;
//!     let output = convert("report.pdf", None, &config).await?;
//!     eprintln!(
//!         "{} pages → {}",
//!         output.stats.page_count,
//!         output.request.output_path().display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `drop`  | on      | Terminal drop target ([`dropzone`], ratatui + crossterm) |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-ocr2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
#[cfg(feature = "drop")]
pub mod dropzone;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{convert_batch, BatchEntry, BatchReport};
pub use config::{ConversionConfig, ConversionConfigBuilder, ImageFormat, PageSeparator};
pub use convert::{convert, convert_request, convert_sync};
pub use error::Ocr2MdError;
pub use output::{ConversionOutput, ConversionStats, SavedImage};
pub use pipeline::input::{acquire, parse_drop_payload, ConversionRequest};
pub use pipeline::ocr::{MistralOcrClient, OcrClientOptions, OcrInput, OcrPage, OcrProvider, OcrResult};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
