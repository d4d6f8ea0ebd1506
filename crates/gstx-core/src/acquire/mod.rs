//! Text acquisition with per-page OCR fallback.

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::error::OcrError;
use crate::models::config::{GstxConfig, PdfConfig};
use crate::models::document::{Document, ExtractedText, MediaType, PageText, Provenance};
use crate::ocr::{self, OcrBackend, PageRasterizer, SegmentationMode};
use crate::pdf::{LopdfTextLayer, TextLayer};

/// Produces the text of a document, preferring the embedded text layer.
pub struct TextAcquirer {
    text_layer: Box<dyn TextLayer>,
    rasterizer: Box<dyn PageRasterizer>,
    ocr: Box<dyn OcrBackend>,
    min_text_chars: usize,
    min_ocr_chars: usize,
}

impl TextAcquirer {
    pub fn new(
        text_layer: Box<dyn TextLayer>,
        rasterizer: Box<dyn PageRasterizer>,
        ocr: Box<dyn OcrBackend>,
        config: &PdfConfig,
    ) -> Self {
        Self {
            text_layer,
            rasterizer,
            ocr,
            min_text_chars: config.min_text_chars,
            min_ocr_chars: config.min_ocr_chars,
        }
    }

    /// Build the acquirer with the backends named in the configuration.
    pub fn from_config(config: &GstxConfig) -> Result<Self, OcrError> {
        Ok(Self::new(
            Box::new(LopdfTextLayer),
            ocr::rasterizer_from_config(&config.pdf),
            ocr::backend_from_config(&config.ocr)?,
            &config.pdf,
        ))
    }

    /// Acquire text for a document. Never fails; problems are reported in the result.
    pub fn acquire(&self, document: &Document) -> ExtractedText {
        let result = match document.media_type() {
            MediaType::Pdf => self.acquire_pdf(document.data()),
            MediaType::PlainText => read_plain_text(document.data()),
            media if media.is_image() => self.acquire_image(document.data()),
            other => ExtractedText::failed(
                Provenance::Direct,
                format!("Unsupported media type: {}", other),
            ),
        };

        if result.success {
            info!(
                "{}: {} ({} chars)",
                document.name(),
                result.message,
                result.text.chars().count()
            );
        } else {
            warn!("{}: {}", document.name(), result.message);
        }
        result
    }

    fn acquire_pdf(&self, data: &[u8]) -> ExtractedText {
        let page_texts = match self.text_layer.page_texts(data) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Text layer unavailable ({}), applying OCR to the whole document", e);
                return self.ocr_whole_document(data, &e.to_string());
            }
        };

        let mut accepted = Vec::new();
        let mut last_error = None;
        for (i, text) in page_texts.iter().enumerate() {
            let number = i as u32 + 1;
            let chars = char_count(text);

            if chars > self.min_text_chars {
                debug!("Text extracted from page {} using the text layer", number);
                accepted.push((number, Provenance::TextLayer, text.clone()));
                continue;
            }

            debug!("Insufficient text on page {} ({} chars), applying OCR", number, chars);
            match self.ocr_page(data, number) {
                Ok(Some(text)) => accepted.push((number, Provenance::Ocr, text)),
                Ok(None) => debug!("OCR produced too little text on page {}", number),
                Err(e) => {
                    warn!("OCR failed for page {}: {}", number, e);
                    last_error = Some(e);
                }
            }
        }

        assemble(
            accepted,
            &no_text_message("No text could be extracted from any page", last_error),
        )
    }

    fn ocr_page(&self, data: &[u8], page: u32) -> Result<Option<String>, OcrError> {
        let mut text = None;
        for image in self.rasterizer.rasterize_pages(data, page, page)? {
            if let Some(t) = self.recognize(&image)? {
                text = Some(t);
            }
        }
        Ok(text)
    }

    fn ocr_whole_document(&self, data: &[u8], cause: &str) -> ExtractedText {
        let images = match self.rasterizer.rasterize_pages(data, 1, u32::MAX) {
            Ok(images) => images,
            Err(e) => {
                return ExtractedText::failed(
                    Provenance::Ocr,
                    format!("Error extracting text: {}; OCR fallback failed: {}", cause, e),
                );
            }
        };

        let mut accepted = Vec::new();
        let mut last_error = None;
        for (i, image) in images.iter().enumerate() {
            let number = i as u32 + 1;
            match self.recognize(image) {
                Ok(Some(text)) => accepted.push((number, Provenance::Ocr, text)),
                Ok(None) => debug!("OCR produced too little text on page {}", number),
                Err(e) => {
                    warn!("OCR failed for page {}: {}", number, e);
                    last_error = Some(e);
                }
            }
        }

        assemble(accepted, &no_text_message("OCR produced no usable text", last_error))
    }

    fn acquire_image(&self, data: &[u8]) -> ExtractedText {
        let image = match image::load_from_memory(data) {
            Ok(image) => image,
            Err(e) => return ExtractedText::failed(Provenance::Ocr, format!("Invalid image: {}", e)),
        };

        match self.recognize(&image) {
            Ok(Some(text)) => assemble(vec![(1, Provenance::Ocr, text)], ""),
            Ok(None) => ExtractedText::failed(Provenance::Ocr, "OCR produced no usable text"),
            Err(e) => ExtractedText::failed(Provenance::Ocr, format!("Error extracting text using OCR: {}", e)),
        }
    }

    /// OCR an image, keeping the output only above the OCR threshold.
    fn recognize(&self, image: &DynamicImage) -> Result<Option<String>, OcrError> {
        let text = self.ocr.image_to_text(image, SegmentationMode::SingleBlock)?;
        Ok((char_count(&text) > self.min_ocr_chars).then_some(text))
    }
}

fn read_plain_text(data: &[u8]) -> ExtractedText {
    let text = String::from_utf8_lossy(data).into_owned();
    let chars = char_count(&text);
    if chars == 0 {
        return ExtractedText::failed(Provenance::Direct, "Document is empty");
    }
    ExtractedText::accepted(
        text,
        Provenance::Direct,
        vec![PageText {
            number: 1,
            provenance: Provenance::Direct,
            chars,
        }],
    )
}

/// Failure message for a document with no accepted page, naming the last OCR error.
fn no_text_message(message: &str, last_error: Option<OcrError>) -> String {
    match last_error {
        Some(e) => format!("{} (last OCR error: {})", message, e),
        None => message.to_string(),
    }
}

/// Join accepted pages in page order, newline separated.
fn assemble(accepted: Vec<(u32, Provenance, String)>, empty_message: &str) -> ExtractedText {
    if accepted.is_empty() {
        return ExtractedText::failed(Provenance::Ocr, empty_message);
    }

    let pages: Vec<PageText> = accepted
        .iter()
        .map(|(number, provenance, text)| PageText {
            number: *number,
            provenance: *provenance,
            chars: char_count(text),
        })
        .collect();

    let mut text = String::new();
    for (_, _, page_text) in &accepted {
        text.push_str(page_text);
        text.push('\n');
    }

    ExtractedText::accepted(text, Provenance::combine(&pages), pages)
}

fn char_count(text: &str) -> usize {
    text.trim().chars().count()
}
