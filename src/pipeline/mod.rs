//! Pipeline stages for PDF-to-Markdown conversion.
//!
//! Each submodule implements one step; [`crate::convert`] chains them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ ocr ──▶ images ──▶ write
//! (path)   (HTTP)  (figures)  (.md)
//! ```
//!
//! 1. [`input`]  — validate the PDF path and derive the output path; also
//!    parses drop-event payloads into paths
//! 2. [`ocr`]    — the provider trait and the Mistral client; the only stage
//!    with network I/O
//! 3. [`images`] — optional figure extraction; decoding runs in
//!    `spawn_blocking` because it is CPU-bound
//! 4. [`write`]  — atomic UTF-8 write of the assembled document

pub mod images;
pub mod input;
pub mod ocr;
pub mod write;
