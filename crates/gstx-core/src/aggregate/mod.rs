//! Result table and batch metrics.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::models::invoice::{FIELD_COUNT, Field, InvoiceRecord, TrustVerdict};

pub const DOCUMENT_COLUMN: &str = "Document";
pub const CONFIDENCE_COLUMN: &str = "Confidence";
pub const TRUST_COLUMN: &str = "Trust";
pub const TRUST_SCORE_COLUMN: &str = "Trust Score";
pub const SOURCE_COLUMN: &str = "Source";

/// Column headers: document, schema fields, then the assessment columns.
pub fn columns() -> Vec<&'static str> {
    let mut columns = Vec::with_capacity(FIELD_COUNT + 5);
    columns.push(DOCUMENT_COLUMN);
    columns.extend(Field::ALL.iter().map(|f| f.name()));
    columns.extend([CONFIDENCE_COLUMN, TRUST_COLUMN, TRUST_SCORE_COLUMN, SOURCE_COLUMN]);
    columns
}

/// Printed row for one record, aligned with [`columns`].
pub fn row(record: &InvoiceRecord) -> Vec<String> {
    let mut row = Vec::with_capacity(FIELD_COUNT + 5);
    row.push(record.document.clone());
    row.extend(Field::ALL.iter().map(|&f| record.fields.display(f)));
    row.push(record.confidence_summary());
    row.push(record.verdict.to_string());
    row.push(record.trust_score.map(|s| format!("{:.2}", s)).unwrap_or_default());
    row.push(record.source.to_string());
    row
}

/// Append-only table of records in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTable {
    records: Vec<InvoiceRecord>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: InvoiceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[InvoiceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.records.iter().map(row).collect()
    }
}

/// Correct/total counts for one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldTally {
    pub correct: usize,
    pub total: usize,
}

impl FieldTally {
    /// Percentage of valid values, if any were seen.
    pub fn accuracy(&self) -> Option<f64> {
        (self.total > 0).then(|| self.correct as f64 / self.total as f64 * 100.0)
    }

    /// `"66.67%"`, or `"N/A"` for an unseen field.
    pub fn accuracy_label(&self) -> String {
        self.accuracy()
            .map(|a| format!("{:.2}%", a))
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// Per-field accuracy and trust counts across a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchMetrics {
    tallies: [FieldTally; FIELD_COUNT],
    pub trusted: usize,
    pub untrusted: usize,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one record's validity flags and verdict.
    pub fn record(&mut self, record: &InvoiceRecord) {
        for check in &record.confidence {
            let tally = &mut self.tallies[check.field.index()];
            tally.total += 1;
            if check.valid {
                tally.correct += 1;
            }
        }
        match record.verdict {
            TrustVerdict::Trusted => self.trusted += 1,
            TrustVerdict::Untrusted => self.untrusted += 1,
        }
    }

    pub fn tally(&self, field: Field) -> FieldTally {
        self.tallies[field.index()]
    }

    /// Accuracy label per field, in schema order.
    pub fn accuracy_rates(&self) -> Vec<(Field, String)> {
        Field::ALL
            .iter()
            .map(|&f| (f, self.tally(f).accuracy_label()))
            .collect()
    }
}

impl Serialize for BatchMetrics {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        #[derive(Serialize)]
        struct FieldAccuracy<'a> {
            field: &'static str,
            correct: usize,
            total: usize,
            accuracy: &'a str,
        }

        let labels = self.accuracy_rates();
        let fields: Vec<FieldAccuracy> = labels
            .iter()
            .map(|(f, label)| {
                let tally = self.tally(*f);
                FieldAccuracy {
                    field: f.name(),
                    correct: tally.correct,
                    total: tally.total,
                    accuracy: label,
                }
            })
            .collect();

        let mut s = serializer.serialize_struct("BatchMetrics", 3)?;
        s.serialize_field("fields", &fields)?;
        s.serialize_field("trusted", &self.trusted)?;
        s.serialize_field("untrusted", &self.untrusted)?;
        s.end()
    }
}

/// Build the table and metrics from records in processing order.
pub fn aggregate(records: impl IntoIterator<Item = InvoiceRecord>) -> (ResultTable, BatchMetrics) {
    let mut table = ResultTable::new();
    let mut metrics = BatchMetrics::new();
    for record in records {
        metrics.record(&record);
        table.push(record);
    }
    (table, metrics)
}

/// A document that produced no record.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub document: String,
    pub message: String,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub table: ResultTable,
    pub metrics: BatchMetrics,
    pub total_files: usize,
    pub failures: Vec<Failure>,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl BatchReport {
    pub fn successful(&self) -> usize {
        self.table.len()
    }
}

/// Single consumer that folds per-document outcomes into a report.
#[derive(Debug)]
pub struct Aggregator {
    table: ResultTable,
    metrics: BatchMetrics,
    failures: Vec<Failure>,
    total_files: usize,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            table: ResultTable::new(),
            metrics: BatchMetrics::new(),
            failures: Vec::new(),
            total_files: 0,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn add_record(&mut self, record: InvoiceRecord) {
        self.total_files += 1;
        self.metrics.record(&record);
        self.table.push(record);
    }

    pub fn add_failure(&mut self, document: impl Into<String>, message: impl Into<String>) {
        self.total_files += 1;
        self.failures.push(Failure {
            document: document.into(),
            message: message.into(),
        });
    }

    pub fn finish(self) -> BatchReport {
        let elapsed = self.started.elapsed();
        info!(
            "Processed {} files in {:.2} seconds ({} successful, {} failed)",
            self.total_files,
            elapsed.as_secs_f64(),
            self.table.len(),
            self.failures.len()
        );
        BatchReport {
            table: self.table,
            metrics: self.metrics,
            total_files: self.total_files,
            failures: self.failures,
            started_at: self.started_at,
            elapsed,
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::config::ExtractionStrategy;
    use crate::models::document::Provenance;
    use crate::models::invoice::{FieldSet, FieldValue};
    use crate::validate::{TierScorer, TrustScorer, check_fields};
    use pretty_assertions::assert_eq;

    pub(crate) fn record(name: &str, fields: FieldSet) -> InvoiceRecord {
        let confidence = check_fields(&fields);
        let assessment = TierScorer.assess(&fields, &confidence);
        InvoiceRecord {
            document: name.to_string(),
            source: Provenance::TextLayer,
            strategy: ExtractionStrategy::Pattern,
            fields,
            confidence,
            trust_score: assessment.score,
            verdict: assessment.verdict,
        }
    }

    fn with_email(name: &str, email: &str) -> InvoiceRecord {
        record(name, FieldSet::new().with(Field::Email, FieldValue::text(email)))
    }

    #[test]
    fn test_two_of_three_valid() {
        let (table, metrics) = aggregate(vec![
            with_email("a.pdf", "a@b.com"),
            with_email("b.pdf", "c@d.org"),
            with_email("c.pdf", "broken"),
        ]);

        assert_eq!(table.len(), 3);
        let tally = metrics.tally(Field::Email);
        assert_eq!(tally, FieldTally { correct: 2, total: 3 });
        assert_eq!(tally.accuracy_label(), "66.67%");
        assert_eq!(metrics.tally(Field::Address).accuracy_label(), "0.00%");
    }

    #[test]
    fn test_empty_batch() {
        let (table, metrics) = aggregate(Vec::new());

        assert!(table.is_empty());
        assert!(table.rows().is_empty());
        assert!(metrics.accuracy_rates().iter().all(|(_, label)| label == "N/A"));
        assert_eq!(metrics.accuracy_rates().len(), FIELD_COUNT);
        assert_eq!((metrics.trusted, metrics.untrusted), (0, 0));
    }

    #[test]
    fn test_totals_never_exceed_records() {
        let (table, metrics) = aggregate(vec![
            with_email("a.pdf", "a@b.com"),
            with_email("b.pdf", "x"),
        ]);
        for field in Field::ALL {
            assert!(metrics.tally(field).total <= table.len());
        }
        assert_eq!(metrics.trusted + metrics.untrusted, table.len());
    }

    #[test]
    fn test_rows_follow_columns() {
        let (table, _) = aggregate(vec![with_email("a.pdf", "a@b.com")]);
        let cols = columns();
        let rows = table.rows();

        assert_eq!(cols.len(), FIELD_COUNT + 5);
        assert_eq!(rows[0].len(), cols.len());
        assert_eq!(rows[0][0], "a.pdf");
        let email_col = cols.iter().position(|c| *c == "Email").unwrap();
        assert_eq!(rows[0][email_col], "a@b.com");
        assert_eq!(rows[0][cols.len() - 3], "Untrusted");
        assert_eq!(rows[0][cols.len() - 2], "");
        assert_eq!(rows[0][cols.len() - 1], "text-layer");
    }

    #[test]
    fn test_aggregator_counts_failures() {
        let mut agg = Aggregator::new();
        agg.add_record(with_email("a.pdf", "a@b.com"));
        agg.add_failure("b.pdf", "No text could be extracted from any page");
        let report = agg.finish();

        assert_eq!(report.total_files, 2);
        assert_eq!(report.successful(), 1);
        assert_eq!(report.failures[0].document, "b.pdf");
    }
}
