//! Single-document conversion entry points.
//!
//! Every conversion is the same linear pipeline, whether it was started from
//! the CLI, a batch, or a drop event:
//!
//! ```text
//! acquire ──▶ credential ──▶ read ──▶ OCR ──▶ figures ──▶ assemble ──▶ write
//! ```
//!
//! The credential is resolved before the PDF is read so a missing key never
//! costs an upload, and the Markdown writer only runs after the provider
//! answered successfully, so a failed conversion never leaves an output file.

use crate::config::ConversionConfig;
use crate::error::Ocr2MdError;
use crate::output::{ConversionOutput, ConversionStats, SavedImage};
use crate::pipeline::images::{self, FigureWriter};
use crate::pipeline::input::{self, ConversionRequest};
use crate::pipeline::ocr::{MistralOcrClient, OcrClientOptions, OcrInput, OcrPage, OcrProvider};
use crate::pipeline::write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Convert a PDF file to Markdown and write it to disk.
///
/// # Arguments
/// * `source` — path to a local `.pdf` file
/// * `output` — Markdown destination; `None` writes `<source>.md` beside
///   the PDF, an existing directory receives `<stem>.md`
/// * `config` — conversion configuration
///
/// # Errors
/// * [`Ocr2MdError::InvalidInput`] — missing, empty or non-PDF source
/// * [`Ocr2MdError::MissingCredential`] — no API key and no injected provider
/// * [`Ocr2MdError::OcrService`] — network or provider failure
/// * [`Ocr2MdError::Write`] — output could not be written
pub async fn convert(
    source: impl AsRef<Path>,
    output: Option<&Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Ocr2MdError> {
    let request = input::acquire(source.as_ref(), output)?;
    convert_request(&request, config).await
}

/// Run the pipeline for an already-validated request.
///
/// This is the entry point the drop zone dispatches to.
pub async fn convert_request(
    request: &ConversionRequest,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Ocr2MdError> {
    let source = request.source_path();
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(source);
    }

    let result = run_pipeline(request, config).await;

    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok(out) => cb.on_conversion_complete(source, request.output_path(), &out.stats),
            Err(e) => cb.on_conversion_error(source, &e.to_string()),
        }
    }
    result
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    source: impl AsRef<Path>,
    output: Option<&Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Ocr2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Ocr2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(source, output, config))
}

async fn run_pipeline(
    request: &ConversionRequest,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Ocr2MdError> {
    let total_start = Instant::now();
    let source = request.source_path();
    info!("Starting conversion: {}", source.display());

    // ── Step 1: Resolve provider (no I/O yet) ────────────────────────────
    let provider = resolve_provider(config)?;

    // ── Step 2: Read the PDF ─────────────────────────────────────────────
    let pdf = tokio::fs::read(source)
        .await
        .map_err(|e| Ocr2MdError::invalid_input(source, e.to_string()))?;
    let doc_size_bytes = pdf.len() as u64;
    debug!("Read {} bytes from {}", doc_size_bytes, source.display());

    // ── Step 3: OCR ──────────────────────────────────────────────────────
    let file_name = request.file_name();
    let ocr_start = Instant::now();
    let result = provider
        .process(OcrInput {
            pdf: &pdf,
            file_name: &file_name,
            include_images: config.image_format.is_some(),
        })
        .await?;
    let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
    drop(pdf);

    if result.pages.is_empty() {
        return Err(Ocr2MdError::OcrService {
            status: None,
            message: "provider returned no pages".to_string(),
        });
    }
    info!(
        "OCR via {} complete: {} pages in {}ms",
        provider.name(),
        result.pages.len(),
        ocr_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_ocr_complete(source, result.pages.len(), ocr_duration_ms);
    }

    // ── Step 4: Figures ──────────────────────────────────────────────────
    let mut pages = result.pages;
    let images = save_figures(request, &mut pages, config).await?;
    let images_saved = images.iter().filter(|i| i.is_success()).count();

    // ── Step 5: Assemble and write ───────────────────────────────────────
    let markdown = assemble_document(&pages, &file_name, images_saved, config);
    if let Err(e) = write::write_markdown(request.output_path(), &markdown).await {
        if !images.is_empty() {
            images::discard_figures(&images, &figure_dir(request).1).await;
        }
        return Err(e);
    }

    let stats = ConversionStats {
        page_count: pages.len(),
        images_saved,
        images_failed: images.len() - images_saved,
        doc_size_bytes,
        ocr_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Wrote {} ({} pages, {} figures) in {}ms",
        request.output_path().display(),
        stats.page_count,
        stats.images_saved,
        stats.total_duration_ms
    );

    Ok(ConversionOutput {
        request: request.clone(),
        markdown,
        pages,
        images,
        stats,
    })
}

/// Resolve the OCR provider: an injected provider wins, otherwise a Mistral
/// client is built from the configured API key.
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn OcrProvider>, Ocr2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    let key = config.api_key.as_deref().unwrap_or_default();
    let client = MistralOcrClient::new(key, OcrClientOptions::from(config))?;
    Ok(Arc::new(client))
}

/// Write figures beside the Markdown file and rewrite page links to them.
async fn save_figures(
    request: &ConversionRequest,
    pages: &mut [OcrPage],
    config: &ConversionConfig,
) -> Result<Vec<SavedImage>, Ocr2MdError> {
    let Some(format) = config.image_format else {
        for page in pages.iter_mut() {
            for img in page.images.iter_mut() {
                img.image_base64 = None;
            }
        }
        return Ok(Vec::new());
    };

    let (link_dir, dir) = figure_dir(request);
    let writer = FigureWriter::new(dir, format, config.jpeg_quality);

    let saved = images::extract_figures(pages, writer).await?;
    if let Some(ref cb) = config.progress_callback {
        for s in &saved {
            cb.on_image_saved(request.source_path(), s);
        }
    }
    for page in pages.iter_mut() {
        page.markdown = images::rewrite_figure_links(&page.markdown, page.index, &saved, &link_dir);
    }
    Ok(saved)
}

/// `<stem>_images`: the link prefix used in the Markdown, and the directory
/// beside the output file it resolves to.
fn figure_dir(request: &ConversionRequest) -> (String, PathBuf) {
    let link_dir = format!("{}_images", input::sanitize_filename(request.source_path()));
    let out_dir = request
        .output_path()
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let dir = out_dir.join(&link_dir);
    (link_dir, dir)
}

/// Assemble the final markdown document from page results.
///
/// With the default config this is the provider's text verbatim: pages
/// joined by a blank line, nothing added.
fn assemble_document(
    pages: &[OcrPage],
    file_name: &str,
    images_saved: usize,
    config: &ConversionConfig,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if config.include_header {
        parts.push(format_header(file_name, pages.len(), images_saved));
    }

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            parts.push(config.page_separator.render(page.index + 1));
        }
        if config.page_headings {
            parts.push(format!("## Page {}\n\n{}", page.index + 1, page.markdown));
        } else {
            parts.push(page.markdown.clone());
        }
    }

    parts.join("")
}

/// Document header: file name, local timestamp and counts.
fn format_header(file_name: &str, page_count: usize, images_saved: usize) -> String {
    format!(
        "# {}\n\n**Processed:** {}\n\n**Pages:** {} | **Images:** {} extracted\n\n---\n\n",
        file_name,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        page_count,
        images_saved
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSeparator;
    use crate::pipeline::ocr::OcrResult;

    fn pages(texts: &[&str]) -> Vec<OcrPage> {
        OcrResult::from_pages(texts.iter().copied()).pages
    }

    #[test]
    fn default_assembly_is_verbatim() {
        let config = ConversionConfig::default();
        assert_eq!(
            assemble_document(&pages(&["# Title\nBody text"]), "a.pdf", 0, &config),
            "# Title\nBody text"
        );
        assert_eq!(
            assemble_document(&pages(&["one", "two"]), "a.pdf", 0, &config),
            "one\n\ntwo"
        );
    }

    #[test]
    fn separator_and_headings() {
        let config = ConversionConfig::builder()
            .page_separator(PageSeparator::Comment)
            .page_headings(true)
            .build()
            .unwrap();
        let md = assemble_document(&pages(&["one", "two"]), "a.pdf", 0, &config);
        assert_eq!(md, "## Page 1\n\none\n\n<!-- page 2 -->\n\n## Page 2\n\ntwo");
    }

    #[test]
    fn header_lists_counts() {
        let config = ConversionConfig::builder().include_header(true).build().unwrap();
        let md = assemble_document(&pages(&["body"]), "report.pdf", 3, &config);
        assert!(md.starts_with("# report.pdf\n\n**Processed:** "));
        assert!(md.contains("**Pages:** 1 | **Images:** 3 extracted\n\n---\n\nbody"));
    }

    #[test]
    fn missing_key_is_missing_credential() {
        let err = resolve_provider(&ConversionConfig::default()).err().unwrap();
        assert!(matches!(err, Ocr2MdError::MissingCredential { .. }));
    }

    #[test]
    fn api_key_builds_mistral_client() {
        let config = ConversionConfig::builder().api_key("sk-test").build().unwrap();
        let provider = resolve_provider(&config).unwrap();
        assert_eq!(provider.name(), "mistral");
    }
}
