//! Input documents and the text acquired from them.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Declared media type of an input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
    Tiff,
    PlainText,
    Other(String),
}

impl MediaType {
    /// Map a MIME string to a media type.
    pub fn from_mime(mime: &str) -> Self {
        match mime.trim().to_lowercase().as_str() {
            "application/pdf" => MediaType::Pdf,
            "image/png" => MediaType::Png,
            "image/jpeg" | "image/jpg" => MediaType::Jpeg,
            "image/tiff" => MediaType::Tiff,
            "text/plain" => MediaType::PlainText,
            other => MediaType::Other(other.to_string()),
        }
    }

    /// Map a file extension to a media type.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => MediaType::Pdf,
            "png" => MediaType::Png,
            "jpg" | "jpeg" => MediaType::Jpeg,
            "tif" | "tiff" => MediaType::Tiff,
            "txt" | "text" => MediaType::PlainText,
            other => MediaType::Other(other.to_string()),
        }
    }

    /// Detect the media type from content, falling back to the file name.
    pub fn detect(name: &str, data: &[u8]) -> Self {
        if let Some(kind) = infer::get(data) {
            let detected = MediaType::from_mime(kind.mime_type());
            if !matches!(detected, MediaType::Other(_)) {
                return detected;
            }
        }

        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(MediaType::from_extension)
            .unwrap_or_else(|| MediaType::Other("application/octet-stream".to_string()))
    }

    /// MIME string for this media type.
    pub fn mime(&self) -> &str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Tiff => "image/tiff",
            MediaType::PlainText => "text/plain",
            MediaType::Other(mime) => mime,
        }
    }

    /// Whether the document is a raster image.
    pub fn is_image(&self) -> bool {
        matches!(self, MediaType::Png | MediaType::Jpeg | MediaType::Tiff)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// One input file. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    media_type: MediaType,
    data: Vec<u8>,
}

impl Document {
    /// Create a document from raw parts.
    pub fn new(name: impl Into<String>, media_type: MediaType, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            data,
        }
    }

    /// Read a document from disk, sniffing its media type.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        let media_type = MediaType::detect(&name, &data);
        Ok(Self::new(name, media_type, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Raw bytes; every reader starts at offset zero.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Where a piece of text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Embedded PDF text layer.
    TextLayer,
    /// Optical character recognition.
    Ocr,
    /// Some pages from the text layer, some from OCR.
    Mixed,
    /// Read directly from a plain-text document.
    Direct,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::TextLayer => "text-layer",
            Provenance::Ocr => "ocr",
            Provenance::Mixed => "mixed",
            Provenance::Direct => "direct",
        }
    }

    /// Combine the provenance of accepted pages into one document tag.
    pub fn combine(pages: &[PageText]) -> Self {
        let mut tags = pages.iter().map(|p| p.provenance);
        let Some(first) = tags.next() else {
            return Provenance::Ocr;
        };
        if tags.all(|t| t == first) {
            first
        } else {
            Provenance::Mixed
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text accepted for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageText {
    /// Page number (1-indexed).
    pub number: u32,
    pub provenance: Provenance,
    /// Trimmed character count of the accepted text.
    pub chars: usize,
}

/// Text acquired for a document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedText {
    pub text: String,
    pub provenance: Provenance,
    pub success: bool,
    pub message: String,
    pub pages: Vec<PageText>,
}

impl ExtractedText {
    /// Successful acquisition.
    pub fn accepted(text: String, provenance: Provenance, pages: Vec<PageText>) -> Self {
        let message = match provenance {
            Provenance::TextLayer => "Text extracted successfully.",
            Provenance::Ocr => "OCR applied successfully.",
            Provenance::Mixed => "Text extracted with OCR fallback on some pages.",
            Provenance::Direct => "Text read directly.",
        };
        Self {
            text,
            provenance,
            success: true,
            message: message.to_string(),
            pages,
        }
    }

    /// Failed acquisition with a diagnostic.
    pub fn failed(provenance: Provenance, message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            provenance,
            success: false,
            message: message.into(),
            pages: Vec::new(),
        }
    }
}
