//! Per-document acquire, extract and score, folded into a batch report.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info};

use crate::acquire::TextAcquirer;
use crate::aggregate::{Aggregator, BatchReport};
use crate::error::GstxError;
use crate::extract::{InvoiceExtractor, extractor_from_config};
use crate::models::config::GstxConfig;
use crate::models::document::Document;
use crate::models::invoice::InvoiceRecord;
use crate::validate::{TrustScorer, check_fields, scorer_from_config};

/// Extraction pipeline over a batch of documents.
pub struct Pipeline {
    acquirer: Arc<TextAcquirer>,
    extractor: Box<dyn InvoiceExtractor>,
    scorer: Box<dyn TrustScorer>,
    jobs: usize,
}

impl Pipeline {
    pub fn new(
        acquirer: TextAcquirer,
        extractor: Box<dyn InvoiceExtractor>,
        scorer: Box<dyn TrustScorer>,
        jobs: usize,
    ) -> Self {
        Self {
            acquirer: Arc::new(acquirer),
            extractor,
            scorer,
            jobs: jobs.max(1),
        }
    }

    /// Build the pipeline from configuration.
    ///
    /// Fails with a configuration error before any backend is touched.
    pub fn from_config(config: &GstxConfig) -> Result<Self, GstxError> {
        config.validate()?;

        let acquirer = TextAcquirer::from_config(config)?;
        let extractor = extractor_from_config(config)?;
        let scorer = scorer_from_config(&config.extraction);
        info!(
            "Pipeline ready: {} extraction, {} scorer, {} jobs",
            extractor.strategy(),
            scorer.name(),
            config.extraction.jobs
        );

        Ok(Self::new(acquirer, extractor, scorer, config.extraction.jobs))
    }

    /// Process one document into a scored record, or a diagnostic naming it.
    pub async fn process_document(&self, document: Document) -> Result<InvoiceRecord, String> {
        let name = document.name().to_string();

        let acquirer = Arc::clone(&self.acquirer);
        let (document, text) = tokio::task::spawn_blocking(move || {
            let text = acquirer.acquire(&document);
            (document, text)
        })
        .await
        .map_err(|e| format!("Text acquisition for {} aborted: {}", name, e))?;

        if !text.success {
            return Err(format!("Failed to extract text from {}: {}", name, text.message));
        }
        debug!("Extracted text from {}:\n{}", name, text.text);

        let fields = self
            .extractor
            .extract(&document, &text)
            .await
            .map_err(|e| format!("Failed to extract fields from {}: {}", name, e))?;

        let confidence = check_fields(&fields);
        let assessment = self.scorer.assess(&fields, &confidence);
        info!("{}: {}", name, assessment.verdict);

        Ok(InvoiceRecord {
            document: name,
            source: text.provenance,
            strategy: self.extractor.strategy(),
            fields,
            confidence,
            trust_score: assessment.score,
            verdict: assessment.verdict,
        })
    }

    /// Run the batch; records come back in input order.
    pub async fn run(&self, documents: Vec<Document>) -> BatchReport {
        self.run_with(documents, |_, _| {}).await
    }

    /// Run the batch, calling `on_done(document, ok)` as each document finishes.
    pub async fn run_with<F>(&self, documents: Vec<Document>, mut on_done: F) -> BatchReport
    where
        F: FnMut(&str, bool),
    {
        let mut aggregator = Aggregator::new();

        let mut outcomes = stream::iter(documents)
            .map(|document| async move {
                let name = document.name().to_string();
                (name, self.process_document(document).await)
            })
            .buffered(self.jobs);

        while let Some((name, outcome)) = outcomes.next().await {
            match outcome {
                Ok(record) => {
                    on_done(&name, true);
                    aggregator.add_record(record);
                }
                Err(message) => {
                    error!("{}", message);
                    on_done(&name, false);
                    aggregator.add_failure(name, message);
                }
            }
        }

        aggregator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::extract::PatternExtractor;
    use crate::models::config::{ExtractionStrategy, PdfConfig};
    use crate::models::document::{ExtractedText, MediaType, Provenance};
    use crate::models::invoice::{Field, FieldSet, TrustVerdict};
    use crate::ocr::{EmbeddedImageRasterizer, TesseractBackend};
    use crate::pdf::LopdfTextLayer;
    use crate::validate::{AverageScorer, TierScorer};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn acquirer() -> TextAcquirer {
        TextAcquirer::new(
            Box::new(LopdfTextLayer),
            Box::new(EmbeddedImageRasterizer),
            Box::new(TesseractBackend::new("eng")),
            &PdfConfig::default(),
        )
    }

    fn text_doc(name: &str, body: &str) -> Document {
        Document::new(name, MediaType::PlainText, body.as_bytes().to_vec())
    }

    /// Finishes later documents first and fails on request.
    struct SlowExtractor;

    #[async_trait]
    impl InvoiceExtractor for SlowExtractor {
        fn strategy(&self) -> ExtractionStrategy {
            ExtractionStrategy::Model
        }

        async fn extract(&self, document: &Document, text: &ExtractedText) -> crate::extract::Result<FieldSet> {
            if text.text.contains("no json") {
                return Err(ExtractionError::NoJson);
            }
            let delay = if document.name() == "a.txt" { 50 } else { 1 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(crate::extract::extract_patterns(&text.text))
        }
    }

    #[tokio::test]
    async fn test_order_follows_input() {
        let pipeline = Pipeline::new(acquirer(), Box::new(SlowExtractor), Box::new(TierScorer), 4);
        let report = pipeline
            .run(vec![
                text_doc("a.txt", "Invoice #: A-1"),
                text_doc("b.txt", "Invoice #: B-2"),
                text_doc("c.txt", "Invoice #: C-3"),
            ])
            .await;

        let names: Vec<&str> = report.table.records().iter().map(|r| r.document.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(report.table.records()[1].fields.display(Field::InvoiceNumber), "B-2");
        assert_eq!(report.table.records()[0].strategy, ExtractionStrategy::Model);
    }

    #[tokio::test]
    async fn test_failing_documents_are_skipped() {
        let pipeline = Pipeline::new(acquirer(), Box::new(SlowExtractor), Box::new(TierScorer), 2);
        let mut seen = Vec::new();
        let report = pipeline
            .run_with(
                vec![
                    text_doc("a.txt", "Invoice #: A-1"),
                    text_doc("empty.txt", "   "),
                    text_doc("bad.txt", "no json here"),
                ],
                |name, ok| seen.push((name.to_string(), ok)),
            )
            .await;

        assert_eq!(report.total_files, 3);
        assert_eq!(report.successful(), 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].message.contains("empty.txt"));
        assert!(report.failures[1].message.contains("bad.txt"));
        assert!(report.failures[1].message.contains("no JSON object"));
        // failed documents contribute nothing to the metrics
        assert_eq!(report.metrics.trusted + report.metrics.untrusted, 1);
        assert_eq!(report.metrics.tally(Field::InvoiceNumber).total, 1);
        assert_eq!(seen[1], ("empty.txt".to_string(), false));
    }

    #[tokio::test]
    async fn test_record_carries_assessment() {
        let pipeline = Pipeline::new(
            acquirer(),
            Box::new(PatternExtractor),
            Box::new(AverageScorer::default()),
            1,
        );
        let record = pipeline
            .process_document(text_doc("a.txt", "Invoice #: A-1\nGSTIN 22AAAAA0000A1Z5\n"))
            .await
            .unwrap();

        assert_eq!(record.source, Provenance::Direct);
        assert_eq!(record.confidence.len(), Field::ALL.len());
        assert!(record.trust_score.is_some());
        assert_eq!(record.verdict, TrustVerdict::Untrusted);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pipeline = Pipeline::new(acquirer(), Box::new(PatternExtractor), Box::new(TierScorer), 4);
        let report = pipeline.run(Vec::new()).await;

        assert_eq!(report.total_files, 0);
        assert!(report.table.is_empty());
    }

    #[tokio::test]
    async fn test_default_config_trusts_complete_invoice() {
        let invoice = "\
TAX INVOICE
Acme Traders
GSTIN 23ABCDE1234F1Z5
Mobile +91 9876543210 Email billing@acme.in
Invoice #: INV-1042
Invoice Date: 12 Mar 2024 Due Date: 26 Mar 2024 Customer Details:
Ravi Kumar
Place of Supply: 27-MAHARASHTRA
Taxable Amount ₹1,000.00
CGST 9.0% ₹90.00
SGST 9.0% ₹90.00
Total ₹1,180.00
";
        let pipeline = Pipeline::from_config(&GstxConfig::default()).unwrap();
        let record = pipeline.process_document(text_doc("invoice.txt", invoice)).await.unwrap();

        assert_eq!(record.strategy, ExtractionStrategy::Pattern);
        assert!(record.trust_score.is_some());
        assert_eq!(record.verdict, TrustVerdict::Trusted);
    }

    #[test]
    fn test_model_strategy_without_key_is_fatal() {
        let mut config = GstxConfig::default();
        config.extraction.strategy = ExtractionStrategy::Model;
        config.model.endpoint = Some("https://example.invalid/chat".to_string());
        config.model.api_key = None;

        let err = Pipeline::from_config(&config).err().unwrap();
        assert!(matches!(err, GstxError::Config(_)));
        assert!(err.to_string().contains("API key or endpoint not found"));
    }
}
