//! Turns uploaded documents and images into bounded plain text.
//!
//! Format and size checks run before any parsing or OCR. Every successful
//! extraction is cleaned and capped at the configured word budget once,
//! here; nothing downstream truncates again.

pub mod document;
pub mod format;
pub mod ocr;
pub mod text;

use std::sync::Arc;

use thiserror::Error;

use crate::core::config::settings::ExtractSettings;
use crate::core::errors::ApiError;

pub use format::{AttachmentFormat, AttachmentKind, DOCUMENT_EXTENSIONS, IMAGE_EXTENSIONS};
pub use ocr::{OcrEngine, TesseractOcr};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unsupported {kind} format: {found}. Supported: {supported}")]
    UnsupportedFormat {
        kind: &'static str,
        found: String,
        supported: String,
    },
    #[error("File too large ({size_mb:.1}MB). Maximum allowed: {limit_mb:.1}MB")]
    Oversize { size_mb: f64, limit_mb: f64 },
    #[error("Empty file")]
    Empty,
    #[error("No text content found in {0}")]
    NoText(&'static str),
    #[error("{0}")]
    Parse(String),
    #[error("Image processing failed: {0}")]
    Ocr(String),
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedFormat { .. } => ApiError::UnsupportedFormat(err.to_string()),
            ExtractError::Oversize { .. } => ApiError::Oversize(err.to_string()),
            ExtractError::Empty | ExtractError::NoText(_) => ApiError::BadRequest(err.to_string()),
            ExtractError::Parse(msg) => {
                ApiError::Internal(format!("Document processing failed: {}", msg))
            }
            ExtractError::Ocr(_) => ApiError::Internal(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Cleaned text, at most the word budget long.
    pub text: String,
    /// Word count before truncation.
    pub word_count: usize,
}

impl ExtractedText {
    pub fn kept_words(&self) -> usize {
        text::count_words(&self.text)
    }

    pub fn was_truncated(&self) -> bool {
        self.kept_words() < self.word_count
    }
}

pub struct ContentExtractor {
    max_words: usize,
    max_image_bytes: usize,
    ocr: Arc<dyn OcrEngine>,
}

impl ContentExtractor {
    pub fn new(settings: &ExtractSettings, ocr: Arc<dyn OcrEngine>) -> Self {
        Self {
            max_words: settings.max_words,
            max_image_bytes: settings.max_image_bytes,
            ocr,
        }
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    /// Resolves the declared format of an upload field and extracts it.
    /// A format outside the field's kind is rejected even if it is
    /// otherwise supported (a PDF in the image field, for example).
    pub async fn extract_upload(
        &self,
        kind: AttachmentKind,
        filename: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<(AttachmentFormat, ExtractedText), ExtractError> {
        let format = AttachmentFormat::detect(filename, content_type)
            .filter(|format| format.kind() == kind)
            .ok_or_else(|| unsupported(kind, filename, content_type))?;
        let extracted = self.extract(bytes, format).await?;
        tracing::info!(
            "Processed {} {}: {} words ({} before truncation)",
            kind.as_str(),
            filename.unwrap_or("<unnamed>"),
            extracted.kept_words(),
            extracted.word_count
        );
        Ok((format, extracted))
    }

    pub async fn extract(
        &self,
        bytes: &[u8],
        format: AttachmentFormat,
    ) -> Result<ExtractedText, ExtractError> {
        if bytes.is_empty() {
            return Err(ExtractError::Empty);
        }

        let raw = match format.kind() {
            AttachmentKind::Image => {
                if bytes.len() > self.max_image_bytes {
                    return Err(ExtractError::Oversize {
                        size_mb: bytes.len() as f64 / 1024.0 / 1024.0,
                        limit_mb: self.max_image_bytes as f64 / 1024.0 / 1024.0,
                    });
                }
                self.ocr.recognize(bytes, format).await?
            }
            AttachmentKind::Document => parse_document(bytes.to_vec(), format).await?,
        };

        let cleaned = text::clean_text(&raw);
        if cleaned.is_empty() {
            return Err(ExtractError::NoText(match format.kind() {
                AttachmentKind::Document => "document",
                AttachmentKind::Image => "image",
            }));
        }

        let word_count = text::count_words(&cleaned);
        Ok(ExtractedText {
            text: text::limit_words(&cleaned, self.max_words),
            word_count,
        })
    }
}

/// PDF and DOCX parsers are CPU-bound and may panic on hostile input, so
/// they run on the blocking pool where a panic surfaces as a join error.
async fn parse_document(bytes: Vec<u8>, format: AttachmentFormat) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || match format {
        AttachmentFormat::Pdf => document::parse_pdf(&bytes),
        AttachmentFormat::Docx => document::parse_docx(&bytes),
        _ => document::parse_txt(&bytes),
    })
    .await
    .map_err(|e| ExtractError::Parse(format!("Failed to process {}: {}", format, e)))?
}

fn unsupported(
    kind: AttachmentKind,
    filename: Option<&str>,
    content_type: Option<&str>,
) -> ExtractError {
    let found = filename
        .and_then(format::extension_of)
        .or_else(|| content_type.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    let supported = match kind {
        AttachmentKind::Document => DOCUMENT_EXTENSIONS.join(", "),
        AttachmentKind::Image => IMAGE_EXTENSIONS.join(", "),
    };
    ExtractError::UnsupportedFormat {
        kind: kind.as_str(),
        found,
        supported,
    }
}
