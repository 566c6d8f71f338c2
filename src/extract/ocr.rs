use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use super::format::AttachmentFormat;
use super::ExtractError;

/// One recognition pass over an image; callers get whatever text the
/// engine produced, possibly empty.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8], format: AttachmentFormat)
        -> Result<String, ExtractError>;
}

/// Runs the `tesseract` CLI against a scratch copy of the image.
pub struct TesseractOcr {
    binary: PathBuf,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(
        &self,
        image: &[u8],
        format: AttachmentFormat,
    ) -> Result<String, ExtractError> {
        let mut file = tempfile::Builder::new()
            .prefix("lexchat-ocr-")
            .suffix(&format!(".{}", format.as_str()))
            .tempfile()
            .map_err(|e| ExtractError::Ocr(format!("Failed to stage image: {}", e)))?;
        file.write_all(image)
            .and_then(|_| file.flush())
            .map_err(|e| ExtractError::Ocr(format!("Failed to stage image: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .output()
            .await
            .map_err(|e| {
                ExtractError::Ocr(format!(
                    "Failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
