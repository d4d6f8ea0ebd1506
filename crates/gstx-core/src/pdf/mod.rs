//! PDF text layer access.

mod extractor;

pub use extractor::{LopdfTextLayer, PdfExtractor};

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Source of embedded (digital) page text.
pub trait TextLayer: Send + Sync {
    /// Text of every page, in page order.
    ///
    /// An error means the document as a whole could not be read
    /// (unparsable, encrypted); a page without text yields an empty string.
    fn page_texts(&self, data: &[u8]) -> Result<Vec<String>>;
}
