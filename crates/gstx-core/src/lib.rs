//! Core library for GST invoice extraction.
//!
//! This crate provides:
//! - Text acquisition from PDFs, images and plain text, with per-page OCR fallback
//! - Invoice field extraction by label patterns or a JSON-emitting model
//! - Per-field validation, confidence tiers and document trust scoring
//! - Batch aggregation, accuracy metrics and CSV/XLSX/JSON exports

pub mod acquire;
pub mod aggregate;
pub mod error;
pub mod export;
pub mod extract;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod validate;

pub use acquire::TextAcquirer;
pub use aggregate::{Aggregator, BatchMetrics, BatchReport, ResultTable, aggregate};
pub use error::{GstxError, Result};
pub use extract::{InvoiceExtractor, ModelExtractor, PatternExtractor};
pub use models::config::{ExtractionStrategy, GstxConfig, ScorerKind};
pub use models::document::{Document, ExtractedText, MediaType, Provenance};
pub use models::invoice::{ConfidenceTier, Field, FieldSet, FieldValue, InvoiceRecord, TrustVerdict};
pub use ocr::{OcrBackend, PageRasterizer};
pub use pipeline::Pipeline;
pub use validate::{AverageScorer, TierScorer, TrustScorer, validate};
