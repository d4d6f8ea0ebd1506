//! OCR through the `tesseract` command-line tool.

use std::process::Command;

use image::DynamicImage;
use tracing::trace;

use super::{OcrBackend, SegmentationMode, check_tool};
use crate::error::OcrError;

/// Runs `tesseract <image> stdout -l <lang> --psm <mode>`.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    language: String,
}

impl TesseractBackend {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }
}

impl OcrBackend for TesseractBackend {
    fn image_to_text(&self, image: &DynamicImage, mode: SegmentationMode) -> Result<String, OcrError> {
        let temp_dir = tempfile::tempdir()?;
        let image_path = temp_dir.path().join("page.png");
        image
            .save(&image_path)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        trace!(
            "Running tesseract on {}x{} image, psm {}",
            image.width(),
            image.height(),
            mode.psm()
        );

        let output = Command::new("tesseract")
            .arg(&image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .args(["--psm", &mode.psm().to_string()])
            .output();

        let output = check_tool(output, "tesseract (install tesseract-ocr)")?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
