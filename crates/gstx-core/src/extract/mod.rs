//! Invoice field extraction strategies.

mod json;
mod model;
mod patterns;

pub use json::{extract_json, parse_json_object};
pub use model::{ModelExtractor, build_prompt, fields_from_json};
pub use patterns::{PatternExtractor, extract_patterns, safe_amount};

use async_trait::async_trait;

use crate::error::{ExtractionError, GstxError};
use crate::llm::ModelClient;
use crate::models::config::{ExtractionStrategy, GstxConfig};
use crate::models::document::{Document, ExtractedText};
use crate::models::invoice::FieldSet;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Maps acquired text to the fixed invoice schema.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    fn strategy(&self) -> ExtractionStrategy;

    async fn extract(&self, document: &Document, text: &ExtractedText) -> Result<FieldSet>;
}

/// Build the extractor for the configured strategy.
pub fn extractor_from_config(config: &GstxConfig) -> std::result::Result<Box<dyn InvoiceExtractor>, GstxError> {
    match config.extraction.strategy {
        ExtractionStrategy::Pattern => Ok(Box::new(PatternExtractor)),
        ExtractionStrategy::Model => {
            let client = ModelClient::from_config(&config.model)?;
            Ok(Box::new(ModelExtractor::new(client, config.model.send_images)))
        }
    }
}
