//! Error types for the gstx-core library.

use thiserror::Error;

/// Main error type for the gstx library.
#[derive(Error, Debug)]
pub enum GstxError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Invoice extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Model backend error.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Export error.
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Required external tool or model is not available.
    #[error("backend not available: {0}")]
    BackendNotAvailable(String),

    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Rasterizing a document page failed.
    #[error("rasterization failed: {0}")]
    Rasterize(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// I/O error while talking to an external tool.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to invoice field extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The model response contained no JSON object.
    #[error("no JSON object found in model response")]
    NoJson,

    /// The JSON object in the model response could not be parsed.
    #[error("invalid JSON in model response: {0}")]
    InvalidJson(String),

    /// The JSON payload was valid but not an object of fields.
    #[error("model response is not a JSON object")]
    NotAnObject,

    /// Model backend failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Errors related to the model backend.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The request could not be sent or timed out.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Still rate limited after exhausting retries.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Backend returned a non-success status.
    #[error("API call failed: {status} - {body}")]
    Status { status: u16, body: String },

    /// Response envelope could not be read.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Errors related to writing or reading exports.
#[derive(Error, Debug)]
pub enum ExportError {
    /// CSV write/read failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet write failure.
    #[error("spreadsheet write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Spreadsheet read failure.
    #[error("spreadsheet read error: {0}")]
    XlsxRead(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the gstx library.
pub type Result<T> = std::result::Result<T, GstxError>;
