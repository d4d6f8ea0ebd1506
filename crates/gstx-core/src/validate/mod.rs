//! Field validation, confidence tiers and document trust.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::config::{ExtractionConfig, ScorerKind};
use crate::models::invoice::{ConfidenceTier, Field, FieldCheck, FieldSet, SCHEMA, TrustVerdict};

lazy_static! {
    static ref PATTERNS: HashMap<Field, Regex> = SCHEMA
        .iter()
        .filter_map(|spec| spec.pattern.map(|p| (spec.field, Regex::new(p).unwrap())))
        .collect();
}

/// Check one value against its field's rule.
///
/// Patterned fields are High when the trimmed value matches and Low
/// otherwise; other fields are Medium when non-empty and Low when empty.
pub fn validate(field: Field, value: &str) -> (bool, ConfidenceTier) {
    let value = value.trim();
    match PATTERNS.get(&field) {
        Some(re) if re.is_match(value) => (true, ConfidenceTier::High),
        Some(_) => (false, ConfidenceTier::Low),
        None if !value.is_empty() => (true, ConfidenceTier::Medium),
        None => (false, ConfidenceTier::Low),
    }
}

/// Validate every schema field in order; absent fields are checked as empty.
pub fn check_fields(fields: &FieldSet) -> Vec<FieldCheck> {
    fields
        .iter()
        .map(|(field, value)| {
            let printed = value.map(|v| v.to_string()).unwrap_or_default();
            let (valid, tier) = validate(field, &printed);
            FieldCheck { field, valid, tier }
        })
        .collect()
}

/// Document-level trust decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub verdict: TrustVerdict,
    /// Numeric score, for policies that compute one.
    pub score: Option<f64>,
}

/// A trust scoring policy.
pub trait TrustScorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn assess(&self, fields: &FieldSet, checks: &[FieldCheck]) -> Assessment;
}

/// Trusted iff no field is Low.
#[derive(Debug, Default, Clone, Copy)]
pub struct TierScorer;

impl TrustScorer for TierScorer {
    fn name(&self) -> &'static str {
        "tier"
    }

    fn assess(&self, _fields: &FieldSet, checks: &[FieldCheck]) -> Assessment {
        let verdict = if checks.iter().any(|c| c.tier == ConfidenceTier::Low) {
            TrustVerdict::Untrusted
        } else {
            TrustVerdict::Trusted
        };
        Assessment { verdict, score: None }
    }
}

/// Weight each scored field gets when it is missing; present fields score 1.0.
pub const AVERAGE_WEIGHTS: [(Field, f64); 11] = [
    (Field::InvoiceNumber, 0.5),
    (Field::InvoiceDate, 0.6),
    (Field::DueDate, 0.6),
    (Field::PlaceOfSupply, 0.5),
    (Field::GstinSupplier, 1.0),
    (Field::TaxableValue, 0.6),
    (Field::CgstAmount, 0.9),
    (Field::SgstAmount, 0.9),
    (Field::IgstAmount, 0.9),
    (Field::FinalAmount, 0.5),
    (Field::TaxAmount, 1.0),
];

/// Trusted iff the mean of per-field scores exceeds the threshold.
#[derive(Debug, Clone, Copy)]
pub struct AverageScorer {
    threshold: f64,
}

impl AverageScorer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn score(&self, fields: &FieldSet) -> f64 {
        let total: f64 = AVERAGE_WEIGHTS
            .iter()
            .map(|&(field, fallback)| if fields.is_present(field) { 1.0 } else { fallback })
            .sum();
        total / AVERAGE_WEIGHTS.len() as f64
    }
}

impl Default for AverageScorer {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl TrustScorer for AverageScorer {
    fn name(&self) -> &'static str {
        "average"
    }

    fn assess(&self, fields: &FieldSet, _checks: &[FieldCheck]) -> Assessment {
        let score = self.score(fields);
        let verdict = if score > self.threshold {
            TrustVerdict::Trusted
        } else {
            TrustVerdict::Untrusted
        };
        Assessment {
            verdict,
            score: Some(score),
        }
    }
}

/// Build the scorer selected in the configuration.
pub fn scorer_from_config(config: &ExtractionConfig) -> Box<dyn TrustScorer> {
    match config.scorer_kind() {
        ScorerKind::Tier => Box::new(TierScorer),
        ScorerKind::Average => Box::new(AverageScorer::new(config.trust_threshold)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::FieldValue;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    #[test]
    fn test_email() {
        assert_eq!(validate(Field::Email, "a@b.com"), (true, ConfidenceTier::High));
        assert_eq!(validate(Field::Email, "not-an-email"), (false, ConfidenceTier::Low));
    }

    #[test]
    fn test_gstin() {
        assert_eq!(
            validate(Field::GstinSupplier, "22AAAAA0000A1Z5"),
            (true, ConfidenceTier::High)
        );
        assert_eq!(
            validate(Field::GstinRecipient, " 22AAAAA0000A1Z5 "),
            (true, ConfidenceTier::High)
        );
        assert_eq!(
            validate(Field::GstinSupplier, "22AAAAA0000A1X5"),
            (false, ConfidenceTier::Low)
        );
    }

    #[test]
    fn test_unpatterned_fields() {
        assert_eq!(validate(Field::Address, "12 Market Road"), (true, ConfidenceTier::Medium));
        assert_eq!(validate(Field::Address, "   "), (false, ConfidenceTier::Low));
        assert_eq!(validate(Field::InvoiceNumber, ""), (false, ConfidenceTier::Low));
    }

    #[test]
    fn test_decimal_fields() {
        assert_eq!(validate(Field::Total, "1180.50"), (true, ConfidenceTier::High));
        assert_eq!(validate(Field::Total, "1,180.50"), (false, ConfidenceTier::Low));
        assert_eq!(validate(Field::Date, "12/03/2024"), (true, ConfidenceTier::High));
    }

    fn full_record() -> FieldSet {
        let mut fields = FieldSet::new();
        for field in Field::ALL {
            let value = match field {
                Field::InvoiceNumber => FieldValue::text("INV-1"),
                Field::Date => FieldValue::text("12/03/2024"),
                Field::Email => FieldValue::text("a@b.com"),
                Field::GstinSupplier | Field::GstinRecipient => FieldValue::text("22AAAAA0000A1Z5"),
                Field::Quantity | Field::Amount | Field::Total => FieldValue::Amount(Decimal::new(100, 0)),
                _ => FieldValue::text("x"),
            };
            fields.set(field, value);
        }
        fields
    }

    #[test]
    fn test_tier_scorer() {
        let fields = full_record();
        let checks = check_fields(&fields);
        assert_eq!(checks.len(), SCHEMA.len());
        assert!(checks.iter().all(|c| c.tier != ConfidenceTier::Low));
        assert_eq!(TierScorer.assess(&fields, &checks).verdict, TrustVerdict::Trusted);

        let broken = fields.with(Field::Email, FieldValue::text("nope"));
        let checks = check_fields(&broken);
        assert_eq!(checks[Field::Email.index()].tier, ConfidenceTier::Low);
        assert_eq!(TierScorer.assess(&broken, &checks).verdict, TrustVerdict::Untrusted);
    }

    #[test]
    fn test_average_scorer() {
        let scorer = AverageScorer::default();
        let empty = FieldSet::new();
        let score = scorer.score(&empty);
        // (0.5 + 0.6 + 0.6 + 0.5 + 1.0 + 0.6 + 0.9 * 3 + 0.5 + 1.0) / 11
        assert!((score - 8.0 / 11.0).abs() < 1e-9);
        assert_eq!(scorer.assess(&empty, &[]).verdict, TrustVerdict::Untrusted);
        assert_eq!(scorer.assess(&full_record(), &[]).score, Some(1.0));
    }

    #[test]
    fn test_scorers_disagree() {
        // only the invoice number missing
        let mut fields = FieldSet::new();
        for field in Field::ALL.into_iter().skip(1) {
            fields.set(field, full_record().get(field).cloned().unwrap());
        }
        let checks = check_fields(&fields);

        let tier = TierScorer.assess(&fields, &checks);
        let average = AverageScorer::default().assess(&fields, &checks);

        assert_eq!(tier.verdict, TrustVerdict::Untrusted);
        assert_eq!(average.verdict, TrustVerdict::Trusted);
        assert!((average.score.unwrap() - 10.5 / 11.0).abs() < 1e-9);
    }
}
