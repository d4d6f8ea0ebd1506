//! Page text and embedded image access using lopdf and pdf-extract.

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::{Result, TextLayer};
use crate::error::PdfError;

/// A loaded PDF document.
pub struct PdfExtractor {
    document: Document,
    raw_data: Vec<u8>,
}

impl PdfExtractor {
    /// Parse a PDF from bytes, decrypting documents with an empty owner password.
    pub fn load(data: &[u8]) -> Result<Self> {
        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let raw_data = if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract needs the decrypted bytes too
            let mut decrypted = Vec::new();
            document
                .save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        if document.get_pages().is_empty() {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", document.get_pages().len());
        Ok(Self { document, raw_data })
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Text layer of a single page (1-indexed).
    pub fn page_text(&self, page: u32) -> Result<String> {
        if page == 0 || page > self.page_count() {
            return Err(PdfError::InvalidPage(page));
        }
        self.document
            .extract_text(&[page])
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    /// Whole-document text through pdf-extract.
    pub fn document_text(&self) -> Result<String> {
        pdf_extract::extract_text_from_mem(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    /// Text of every page.
    ///
    /// When lopdf cannot decode any page, the pdf-extract output is spread
    /// across the pages by line count.
    pub fn page_texts(&self) -> Result<Vec<String>> {
        let count = self.page_count();
        let mut texts = Vec::with_capacity(count as usize);
        let mut failures = 0;

        for page in 1..=count {
            match self.page_text(page) {
                Ok(text) => texts.push(text),
                Err(e) => {
                    trace!("lopdf text extraction failed on page {}: {}", page, e);
                    failures += 1;
                    texts.push(String::new());
                }
            }
        }

        if failures < count {
            return Ok(texts);
        }

        warn!("lopdf could not decode any page text, falling back to pdf-extract");
        let full_text = self.document_text()?;
        let lines: Vec<&str> = full_text.lines().collect();
        let per_page = lines.len().div_ceil(count as usize).max(1);

        Ok((0..count as usize)
            .map(|i| {
                let start = (i * per_page).min(lines.len());
                let end = ((i + 1) * per_page).min(lines.len());
                lines[start..end].join("\n")
            })
            .collect())
    }

    /// Images embedded in a page (1-indexed), in resource order.
    pub fn extract_images(&self, page: u32) -> Result<Vec<DynamicImage>> {
        let pages = self.document.get_pages();
        let page_id = pages.get(&page).ok_or(PdfError::InvalidPage(page))?;

        let mut images = Vec::new();
        if let Some(resources) = self.page_resources(*page_id) {
            if let Ok(xobjects) = resources.get(b"XObject") {
                if let Ok((_, Object::Dictionary(xobjects))) = self.document.dereference(xobjects) {
                    for (_name, obj_ref) in xobjects.iter() {
                        if let Ok((_, obj)) = self.document.dereference(obj_ref) {
                            if let Some(img) = self.decode_image(obj) {
                                images.push(img);
                            }
                        }
                    }
                }
            }
        }

        debug!("Extracted {} images from page {}", images.len(), page);
        Ok(images)
    }

    fn decode_image(&self, obj: &Object) -> Option<DynamicImage> {
        let Object::Stream(stream) = obj else {
            return None;
        };
        let dict = &stream.dict;
        if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
            return None;
        }

        let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
        let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
        trace!("Found image object: {}x{}", width, height);

        let filter = dict.get(b"Filter").ok().and_then(|f| match f {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            _ => None,
        });

        match filter {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                    .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Unsupported image filter");
                return None;
            }
            _ => {}
        }

        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8);
        if bits != 8 {
            trace!("Unsupported bits per component: {}", bits);
            return None;
        }

        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                Object::Reference(r) => self.document.get_object(*r).ok().and_then(|o| o.as_name().ok()),
                _ => None,
            })
            .unwrap_or(b"DeviceRGB");

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let pixels = (width as usize).checked_mul(height as usize)?;
        let rgb_len = pixels.checked_mul(3)?;

        match color_space {
            b"DeviceRGB" | b"RGB" if data.len() >= rgb_len => {
                RgbImage::from_raw(width, height, data[..rgb_len].to_vec())
                    .map(DynamicImage::ImageRgb8)
            }
            b"DeviceGray" | b"G" if data.len() >= pixels => {
                GrayImage::from_raw(width, height, data[..pixels].to_vec())
                    .map(DynamicImage::ImageLuma8)
            }
            _ => {
                trace!("Could not decode image: data_len={}, pixels={}", data.len(), pixels);
                None
            }
        }
    }

    /// Resources of a page, inherited from the page tree when absent.
    fn page_resources(&self, node_id: ObjectId) -> Option<Dictionary> {
        let Ok(Object::Dictionary(dict)) = self.document.get_object(node_id) else {
            return None;
        };

        if let Ok(resources) = dict.get(b"Resources") {
            if let Ok((_, Object::Dictionary(res))) = self.document.dereference(resources) {
                return Some(res.clone());
            }
        }

        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => self.page_resources(*parent_id),
            _ => None,
        }
    }
}

/// Text layer backed by [`PdfExtractor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfTextLayer;

impl TextLayer for LopdfTextLayer {
    fn page_texts(&self, data: &[u8]) -> Result<Vec<String>> {
        PdfExtractor::load(data)?.page_texts()
    }
}
