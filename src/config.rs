//! Configuration types for PDF-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One config value is cloned into every
//! conversion (including each drop-zone task), so it holds only immutable
//! settings plus an optional shared provider handle.
//!
//! The API key lives here rather than being read from the environment inside
//! the library. The binary fills it from `MISTRAL_API_KEY` via clap; tests
//! inject fake keys or a fake [`OcrProvider`] directly.

use crate::error::Ocr2MdError;
use crate::pipeline::ocr::OcrProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default Mistral API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Default OCR model.
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

/// Environment variable the CLI reads the API key from.
pub const API_KEY_ENV: &str = "MISTRAL_API_KEY";

/// Configuration for a PDF-to-Markdown conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ocr2md::{ConversionConfig, ImageFormat};
///
/// let config = ConversionConfig::builder()
///     .api_key("sk-test")
///     .timeout_secs(60)
///     .image_format(ImageFormat::Png)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// API key for the OCR provider. Required unless `provider` is set.
    pub api_key: Option<String>,

    /// Base URL of the OCR API. Default: [`DEFAULT_BASE_URL`].
    ///
    /// Override to point at a proxy or a local test server.
    pub base_url: String,

    /// OCR model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Pre-constructed OCR provider. Takes precedence over `api_key`.
    pub provider: Option<Arc<dyn OcrProvider>>,

    /// Whole-request HTTP timeout in seconds. Default: 120.
    ///
    /// OCR of a long document is a single call, so this bounds the upload,
    /// the provider's processing time and the download of the result.
    pub timeout_secs: u64,

    /// Extract embedded figures to files. Default: None (no figures).
    ///
    /// When set, the provider is asked to return figure bytes and each page's
    /// figure references are rewritten to the saved files.
    pub image_format: Option<ImageFormat>,

    /// JPEG quality (1–100) used when `image_format` is [`ImageFormat::Jpeg`]. Default: 95.
    pub jpeg_quality: u8,

    /// Separator inserted between pages in the assembled output. Default: None.
    pub page_separator: PageSeparator,

    /// Prefix every page with a `## Page N` heading. Default: false.
    pub page_headings: bool,

    /// Prepend a document header (file name, timestamp, counts). Default: false.
    pub include_header: bool,

    /// Optional progress observer.
    pub progress_callback: Option<crate::progress::ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            timeout_secs: 120,
            image_format: None,
            jpeg_quality: 95,
            page_separator: PageSeparator::default(),
            page_headings: false,
            include_header: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("timeout_secs", &self.timeout_secs)
            .field("image_format", &self.image_format)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("page_separator", &self.page_separator)
            .field("page_headings", &self.page_headings)
            .field("include_header", &self.include_header)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn OcrProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = Some(format);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn page_headings(mut self, v: bool) -> Self {
        self.config.page_headings = v;
        self
    }

    pub fn include_header(mut self, v: bool) -> Self {
        self.config.include_header = v;
        self
    }

    pub fn progress_callback(mut self, cb: crate::progress::ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// A missing API key is *not* a build error: it is reported as
    /// [`Ocr2MdError::MissingCredential`] when a conversion actually needs it,
    /// after input validation, so a bad path is reported as such first.
    pub fn build(self) -> Result<ConversionConfig, Ocr2MdError> {
        let c = &self.config;
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(Ocr2MdError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.timeout_secs == 0 {
            return Err(Ocr2MdError::InvalidConfig(
                "Timeout must be ≥ 1 second".into(),
            ));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(Ocr2MdError::InvalidConfig(format!(
                "Base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.model.trim().is_empty() {
            return Err(Ocr2MdError::InvalidConfig("Model must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// File format for extracted figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Keep whatever format the figure was detected as (JPEG, PNG or GIF).
    Original,
    /// Re-encode as JPEG at the configured quality, dropping alpha.
    Jpeg,
    /// Re-encode as lossless PNG.
    Png,
}

impl std::str::FromStr for ImageFormat {
    type Err = Ocr2MdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "original" => Ok(ImageFormat::Original),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(Ocr2MdError::InvalidConfig(format!(
                "Image format must be 'original', 'jpg' or 'png', got '{other}'"
            ))),
        }
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }

    /// Parse the CLI spelling: `none`, `hr`/`---`, `comment`, or any custom string.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => PageSeparator::None,
            "hr" | "---" => PageSeparator::HorizontalRule,
            "comment" => PageSeparator::Comment,
            _ => PageSeparator::Custom(s.to_string()),
        }
    }
}
