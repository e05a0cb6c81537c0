//! Error types for the edgequake-ocr2md library.
//!
//! Every conversion is a linear pipeline (acquire → OCR → write), so a single
//! error type covers it. Each variant is terminal for the conversion in
//! progress and maps to a distinct process exit code via
//! [`Ocr2MdError::exit_code`], which lets shell scripts tell a bad input file
//! apart from a missing API key or a provider outage.
//!
//! Figure extraction is the one place where partial failure is tolerated: a
//! figure that cannot be decoded is recorded on [`crate::output::SavedImage`]
//! and never surfaces here.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr2md library.
#[derive(Debug, Error)]
pub enum Ocr2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source file is missing, unreadable, empty or not a PDF.
    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// No API key was supplied for the OCR provider.
    #[error("No API key configured for OCR provider '{provider}'.\nSet {env_var} or pass --api-key.")]
    MissingCredential {
        provider: String,
        env_var: String,
    },

    /// The OCR provider could not be reached, rejected the request, or
    /// returned a body that could not be parsed.
    #[error("OCR service error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    OcrService {
        status: Option<u16>,
        message: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Ocr2MdError {
    /// Build an [`Ocr2MdError::InvalidInput`] for `path`.
    pub fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// | Code | Error |
    /// |------|-------|
    /// | 3 | `InvalidInput` |
    /// | 4 | `MissingCredential` |
    /// | 5 | `OcrService` |
    /// | 6 | `Write` |
    /// | 1 | anything else |
    ///
    /// Code 2 is left to clap for command-line usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Ocr2MdError::InvalidInput { .. } => 3,
            Ocr2MdError::MissingCredential { .. } => 4,
            Ocr2MdError::OcrService { .. } => 5,
            Ocr2MdError::Write { .. } => 6,
            Ocr2MdError::InvalidConfig(_) | Ocr2MdError::Internal(_) => 1,
        }
    }
}
