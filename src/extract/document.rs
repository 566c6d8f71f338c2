//! Direct text extraction for the document formats.

use super::text::decode_text;
use super::ExtractError;

pub fn parse_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractError::Parse(format!("Failed to process PDF: {}", e)))?;
    Ok(text.trim().to_string())
}

pub fn parse_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = docx_rs::read_docx(bytes)
        .map_err(|e| ExtractError::Parse(format!("Failed to process DOCX: {}", e)))?;

    let mut content = String::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            let mut paragraph = String::new();
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            paragraph.push_str(&t.text);
                        }
                    }
                }
            }
            if !paragraph.trim().is_empty() {
                content.push_str(&paragraph);
                content.push('\n');
            }
        }
    }

    Ok(content.trim().to_string())
}

pub fn parse_txt(bytes: &[u8]) -> Result<String, ExtractError> {
    Ok(decode_text(bytes).trim().to_string())
}
