//! Assembles one user turn: the question plus any extracted attachments
//! and free-text context.

use crate::core::errors::ApiError;
use crate::extract::{text::count_words, AttachmentFormat, AttachmentKind, ExtractedText};
use crate::history::AttachmentMeta;

#[derive(Debug, Clone)]
pub struct TurnAttachment {
    pub kind: AttachmentKind,
    pub format: AttachmentFormat,
    pub filename: Option<String>,
    pub extracted: ExtractedText,
}

impl TurnAttachment {
    pub fn meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            kind: self.kind.as_str().to_string(),
            format: self.format.as_str().to_string(),
            filename: self.filename.clone(),
            excerpt: self.extracted.text.clone(),
            word_count: self.extracted.word_count,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserTurn {
    pub message: String,
    pub document: Option<TurnAttachment>,
    pub image: Option<TurnAttachment>,
    pub context: Option<String>,
}

impl UserTurn {
    /// Rejects a blank question; blank context is dropped.
    pub fn new(message: &str, context: Option<&str>) -> Result<Self, ApiError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ApiError::BadRequest("Message is required".to_string()));
        }
        Ok(Self {
            message: message.to_string(),
            document: None,
            image: None,
            context: context
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
    }

    /// Words contributed by attachments (as kept after truncation) and
    /// context. The question itself is not counted.
    pub fn content_words(&self) -> usize {
        let attachments: usize = self
            .attachments()
            .map(|a| a.extracted.kept_words())
            .sum();
        attachments + self.context.as_deref().map(count_words).unwrap_or(0)
    }

    pub fn check_budget(&self, max_words: usize) -> Result<usize, ApiError> {
        let total = self.content_words();
        if total > max_words {
            return Err(ApiError::BadRequest(format!(
                "Total content too large ({} words). Maximum allowed: {} words.",
                total, max_words
            )));
        }
        Ok(total)
    }

    /// The text sent to the model for this turn.
    pub fn prompt(&self) -> String {
        let mut parts = Vec::new();
        if let Some(doc) = &self.document {
            parts.push(format!("Document content:\n{}", doc.extracted.text));
        }
        if let Some(image) = &self.image {
            parts.push(format!("Image content:\n{}", image.extracted.text));
        }
        if let Some(context) = &self.context {
            parts.push(format!("Additional context:\n{}", context));
        }

        if parts.is_empty() {
            self.message.clone()
        } else {
            format!("{}\n\nUser question: {}", parts.join("\n\n"), self.message)
        }
    }

    pub fn has_context(&self) -> bool {
        self.document.is_some() || self.image.is_some() || self.context.is_some()
    }

    /// Labels of the context blocks included in the prompt.
    pub fn context_labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if self.document.is_some() {
            labels.push("document".to_string());
        }
        if self.image.is_some() {
            labels.push("image".to_string());
        }
        if self.context.is_some() {
            labels.push("context".to_string());
        }
        labels
    }

    pub fn attachment_meta(&self) -> Vec<AttachmentMeta> {
        self.attachments().map(TurnAttachment::meta).collect()
    }

    fn attachments(&self) -> impl Iterator<Item = &TurnAttachment> {
        self.document.iter().chain(self.image.iter())
    }

    /// Session title for a conversation started by this turn.
    pub fn title(&self) -> String {
        let mut title: String = self.message.chars().take(50).collect();
        if self.message.chars().count() > 50 {
            title.push_str("...");
        }
        title
    }
}
