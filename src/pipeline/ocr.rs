//! OCR provider interaction: upload a PDF, get Markdown back.
//!
//! [`OcrProvider`] is the seam between the pipeline and the network. The
//! production implementation, [`MistralOcrClient`], performs exactly one
//! authenticated `POST /v1/ocr` per document with the PDF inlined as a
//! base64 data URI. Tests plug in their own provider through
//! [`crate::ConversionConfig::provider`].
//!
//! ## Failure mapping
//!
//! | Condition | Error |
//! |-----------|-------|
//! | empty API key | `MissingCredential` (before any I/O) |
//! | connect / TLS / timeout | `OcrService { status: None }` |
//! | non-2xx | `OcrService { status: Some(code) }`, provider message extracted |
//! | 2xx with unparseable body | `OcrService { status: Some(code) }` |
//!
//! Nothing is retried here; reqwest's own connection handling is the only
//! recovery.

use crate::config::{ConversionConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::error::Ocr2MdError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// What is sent to the provider for one document.
#[derive(Debug, Clone, Copy)]
pub struct OcrInput<'a> {
    /// Raw PDF bytes.
    pub pdf: &'a [u8],
    /// File name, forwarded as a hint to the provider.
    pub file_name: &'a str,
    /// Ask the provider to return embedded figures as base64.
    pub include_images: bool,
}

/// A remote OCR service that turns a PDF into per-page Markdown.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Run OCR over one document.
    async fn process(&self, input: OcrInput<'_>) -> Result<OcrResult, Ocr2MdError>;

    /// Short provider identifier used in logs.
    fn name(&self) -> &str;
}

// ── Wire types ───────────────────────────────────────────────────────────

/// The provider's response for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResult {
    /// Pages in provider order.
    pub pages: Vec<OcrPage>,
    /// Model that served the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider-side accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_info: Option<UsageInfo>,
}

impl OcrResult {
    /// Build a result from plain page texts, indexed from 0.
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages
                .into_iter()
                .enumerate()
                .map(|(index, markdown)| OcrPage {
                    index,
                    markdown: markdown.into(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    /// All page Markdown joined with a blank line.
    pub fn raw_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Total number of figures returned across all pages.
    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

/// One page of OCR output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrPage {
    /// Provider page index (0-based for Mistral).
    pub index: usize,
    /// Extracted Markdown; `null` from the provider becomes empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub markdown: String,
    /// Figures found on the page.
    #[serde(default)]
    pub images: Vec<OcrImage>,
    /// Page geometry, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<PageDimensions>,
}

/// A figure embedded in a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrImage {
    /// Provider id, also used as the link target in the page Markdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Figure bytes as base64, optionally as a `data:` URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

/// Page size as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    pub width: u32,
    pub height: u32,
}

/// Provider-side usage accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub pages_processed: Option<usize>,
    #[serde(default)]
    pub doc_size_bytes: Option<u64>,
}

fn null_as_empty<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

// ── Mistral client ───────────────────────────────────────────────────────

/// Connection settings for [`MistralOcrClient`].
#[derive(Debug, Clone)]
pub struct OcrClientOptions {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OcrClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

impl From<&ConversionConfig> for OcrClientOptions {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

/// Client for the Mistral OCR endpoint.
pub struct MistralOcrClient {
    http: reqwest::Client,
    api_key: String,
    options: OcrClientOptions,
}

impl std::fmt::Debug for MistralOcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrClient")
            .field("api_key", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl MistralOcrClient {
    /// Create a client with an explicit credential.
    ///
    /// Fails with [`Ocr2MdError::MissingCredential`] when `api_key` is blank.
    pub fn new(api_key: impl Into<String>, options: OcrClientOptions) -> Result<Self, Ocr2MdError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Ocr2MdError::MissingCredential {
                provider: "mistral".to_string(),
                env_var: crate::config::API_KEY_ENV.to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| Ocr2MdError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
            options,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/ocr", self.options.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, input: &OcrInput<'_>) -> serde_json::Value {
        let data_uri = format!("data:application/pdf;base64,{}", STANDARD.encode(input.pdf));
        serde_json::json!({
            "model": self.options.model,
            "document": {
                "type": "document_url",
                "document_url": data_uri,
                "document_name": input.file_name,
            },
            "include_image_base64": input.include_images,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> Ocr2MdError {
        let message = if e.is_timeout() {
            format!("request timed out after {}s", self.options.timeout_secs)
        } else if e.is_connect() {
            format!("could not connect to {}: {e}", self.options.base_url)
        } else {
            format!("request failed: {e}")
        };
        Ocr2MdError::OcrService {
            status: None,
            message,
        }
    }
}

#[async_trait]
impl OcrProvider for MistralOcrClient {
    async fn process(&self, input: OcrInput<'_>) -> Result<OcrResult, Ocr2MdError> {
        let body = self.request_body(&input);
        debug!(
            "POST {} ({} PDF bytes, images: {})",
            self.endpoint(),
            input.pdf.len(),
            input.include_images
        );

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = provider_message(&text).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });
            return Err(Ocr2MdError::OcrService {
                status: Some(status.as_u16()),
                message,
            });
        }

        let result: OcrResult =
            serde_json::from_str(&text).map_err(|e| Ocr2MdError::OcrService {
                status: Some(status.as_u16()),
                message: format!("malformed response: {e}"),
            })?;

        info!(
            "OCR returned {} pages, {} figures",
            result.pages.len(),
            result.image_count()
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "mistral"
    }
}

/// Pull a human-readable message out of an error body.
///
/// Mistral answers with `{"message": …}` for most errors and
/// `{"detail": …}` for auth and validation failures; other gateways use
/// `{"error": …}`. Falls back to the trimmed raw body.
fn provider_message(body: &str) -> Option<String> {
    const MAX_LEN: usize = 500;

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "detail", "error"] {
            match value.get(key) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(serde_json::Value::Object(o)) => {
                    if let Some(serde_json::Value::String(s)) = o.get("message") {
                        return Some(s.clone());
                    }
                    return Some(serde_json::Value::Object(o.clone()).to_string());
                }
                Some(v) if v.is_array() => return Some(v.to_string()),
                _ => {}
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(MAX_LEN).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "pages": [
            {
                "index": 0,
                "markdown": "# Title\n\n![img-0.jpeg](img-0.jpeg)",
                "images": [{"id": "img-0.jpeg", "top_left_x": 10, "image_base64": "data:image/jpeg;base64,/9j/"}],
                "dimensions": {"dpi": 200, "height": 2200, "width": 1700}
            },
            {"index": 1, "markdown": null, "images": []}
        ],
        "model": "mistral-ocr-2505",
        "usage_info": {"pages_processed": 2, "doc_size_bytes": 12345}
    }"##;

    #[test]
    fn deserialises_provider_response() {
        let r: OcrResult = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(r.pages.len(), 2);
        assert_eq!(r.pages[0].images[0].id.as_deref(), Some("img-0.jpeg"));
        assert_eq!(r.pages[0].dimensions.unwrap().width, 1700);
        assert_eq!(r.pages[1].markdown, "");
        assert_eq!(r.model.as_deref(), Some("mistral-ocr-2505"));
        assert_eq!(r.usage_info.unwrap().pages_processed, Some(2));
        assert_eq!(r.image_count(), 1);
    }

    #[test]
    fn raw_text_joins_pages() {
        let r = OcrResult::from_pages(["one", "two"]);
        assert_eq!(r.raw_text(), "one\n\ntwo");
        assert_eq!(r.pages[1].index, 1);
    }

    #[test]
    fn blank_key_is_missing_credential() {
        let err = MistralOcrClient::new("   ", OcrClientOptions::default()).unwrap_err();
        assert!(matches!(err, Ocr2MdError::MissingCredential { .. }));
    }

    #[test]
    fn request_body_inlines_pdf_as_data_uri() {
        let client = MistralOcrClient::new("sk-test", OcrClientOptions::default()).unwrap();
        let body = client.request_body(&OcrInput {
            pdf: b"%PDF",
            file_name: "a.pdf",
            include_images: true,
        });
        assert_eq!(body["model"], "mistral-ocr-latest");
        assert_eq!(body["document"]["type"], "document_url");
        assert_eq!(
            body["document"]["document_url"],
            "data:application/pdf;base64,JVBERg=="
        );
        assert_eq!(body["include_image_base64"], true);
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = MistralOcrClient::new(
            "sk-test",
            OcrClientOptions {
                base_url: "http://localhost:9/".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/ocr");
    }

    #[test]
    fn debug_redacts_key() {
        let client = MistralOcrClient::new("sk-secret", OcrClientOptions::default()).unwrap();
        assert!(!format!("{client:?}").contains("sk-secret"));
    }

    #[test]
    fn provider_message_variants() {
        assert_eq!(
            provider_message(r#"{"object":"error","message":"Invalid model"}"#).as_deref(),
            Some("Invalid model")
        );
        assert_eq!(provider_message(r#"{"detail":"Unauthorized"}"#).as_deref(), Some("Unauthorized"));
        assert_eq!(
            provider_message(r#"{"error":{"message":"quota exceeded"}}"#).as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(provider_message("upstream connect error").as_deref(), Some("upstream connect error"));
        assert_eq!(provider_message("   "), None);
    }
}
