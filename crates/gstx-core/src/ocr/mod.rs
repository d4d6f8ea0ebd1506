//! OCR backends and page rasterizers.

mod rasterize;
mod tesseract;

#[cfg(feature = "native")]
mod pure_engine;

pub use rasterize::{EmbeddedImageRasterizer, PdftoppmRasterizer};
pub use tesseract::TesseractBackend;

#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;

use image::DynamicImage;

use crate::error::OcrError;
use crate::models::config::{OcrBackendKind, OcrConfig, PdfConfig, RasterizerKind};

/// Page segmentation hint passed to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentationMode {
    /// Fully automatic page segmentation.
    Auto,
    /// Assume a single uniform block of text.
    #[default]
    SingleBlock,
}

impl SegmentationMode {
    /// Tesseract `--psm` value.
    pub fn psm(&self) -> u8 {
        match self {
            SegmentationMode::Auto => 3,
            SegmentationMode::SingleBlock => 6,
        }
    }
}

/// Recognizes text in an image.
pub trait OcrBackend: Send + Sync {
    fn image_to_text(&self, image: &DynamicImage, mode: SegmentationMode) -> Result<String, OcrError>;
}

/// Turns PDF pages into images.
pub trait PageRasterizer: Send + Sync {
    /// Images for pages `first..=last` (1-indexed), in page order.
    ///
    /// `last` is clamped to the document's page count.
    fn rasterize_pages(&self, data: &[u8], first: u32, last: u32) -> Result<Vec<DynamicImage>, OcrError>;
}

/// Build the OCR backend selected in the configuration.
pub fn backend_from_config(config: &OcrConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    match config.backend {
        OcrBackendKind::Tesseract => Ok(Box::new(TesseractBackend::new(&config.language))),
        #[cfg(feature = "native")]
        OcrBackendKind::Onnx => Ok(Box::new(PureOcrEngine::from_dir(
            &config.model_dir,
            config.keep_unk,
        )?)),
        #[cfg(not(feature = "native"))]
        OcrBackendKind::Onnx => Err(OcrError::BackendNotAvailable(
            "ONNX OCR requires the `native` feature".to_string(),
        )),
    }
}

/// Build the page rasterizer selected in the configuration.
pub fn rasterizer_from_config(config: &PdfConfig) -> Box<dyn PageRasterizer> {
    match config.rasterizer {
        RasterizerKind::Pdftoppm => Box::new(PdftoppmRasterizer::new(config.render_dpi)),
        RasterizerKind::Embedded => Box::new(EmbeddedImageRasterizer),
    }
}

/// Map the result of running an external tool, keeping "not installed" distinct.
fn check_tool(
    result: std::io::Result<std::process::Output>,
    tool: &str,
) -> Result<std::process::Output, OcrError> {
    match result {
        Ok(output) if output.status.success() => Ok(output),
        Ok(output) => Err(OcrError::Recognition(format!(
            "{} failed: {}",
            tool,
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(OcrError::BackendNotAvailable(tool.to_string()))
        }
        Err(e) => Err(OcrError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block_is_psm_6() {
        assert_eq!(SegmentationMode::default().psm(), 6);
        assert_eq!(SegmentationMode::Auto.psm(), 3);
    }

    #[test]
    fn test_missing_tool_is_not_available() {
        let result = std::process::Command::new("gstx-no-such-tool-xyz").output();
        assert!(matches!(
            check_tool(result, "gstx-no-such-tool-xyz"),
            Err(OcrError::BackendNotAvailable(_))
        ));
    }
}
