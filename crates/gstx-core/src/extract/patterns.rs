//! Pattern-based extraction for GST invoice layouts.

use std::str::FromStr;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use tracing::debug;

use super::{InvoiceExtractor, Result};
use crate::models::config::ExtractionStrategy;
use crate::models::document::{Document, ExtractedText};
use crate::models::invoice::{Field, FieldSet, FieldValue};

lazy_static! {
    static ref INVOICE_NUMBER: Regex = Regex::new(r"Invoice #:\s*([A-Za-z0-9\-]+)").unwrap();

    static ref INVOICE_DATE: Regex =
        Regex::new(r"Invoice Date:\s*([0-9A-Za-z\s]+?)\s*Due Date:").unwrap();

    static ref DUE_DATE: Regex =
        Regex::new(r"Due Date:\s*([0-9A-Za-z\s]+?)\s*Customer Details:").unwrap();

    static ref PLACE_OF_SUPPLY: Regex = Regex::new(r"Place of Supply:\s*([0-9A-Za-z \-]+)").unwrap();

    // supplier address line: "<city>, <State>, <PIN>"
    static ref PLACE_OF_ORIGIN: Regex =
        Regex::new(r"[A-Za-z][A-Za-z ]*,\s*([A-Za-z][A-Za-z ]*?)\s*,\s*[0-9]{6}\b").unwrap();

    static ref MOBILE: Regex = Regex::new(r"Mobile[\s:]*(?:\+\d{1,3}\s+)?\+?([0-9]{6,})").unwrap();

    static ref EMAIL: Regex = Regex::new(r"Email[\s:]*([A-Za-z0-9@.\-_]+)").unwrap();

    static ref CUSTOMER_DETAILS: Regex = Regex::new(r"Customer Details:\s*([A-Za-z\s]+)").unwrap();

    static ref CUSTOMER_TRAILER: Regex = Regex::new(r"\b(?:Place of Supply|Ph)\b.*").unwrap();

    static ref GSTIN: Regex = Regex::new(r"GSTIN[\s:]*([A-Za-z0-9]+)").unwrap();

    static ref TAXABLE_AMOUNT: Regex = Regex::new(r"Taxable Amount\s*₹([0-9,]+\.\d{2})").unwrap();

    static ref CGST: Regex = Regex::new(r"CGST\s*(\d+\.?\d*)%?\s*₹([0-9,]+\.\d{2})").unwrap();

    static ref SGST: Regex = Regex::new(r"SGST\s*(\d+\.?\d*)%?\s*₹([0-9,]+\.\d{2})").unwrap();

    static ref IGST: Regex = Regex::new(r"IGST\s*(\d+\.?\d*)%?\s*₹([0-9,]+\.\d{2})").unwrap();

    static ref TOTAL: Regex = Regex::new(r"Total\s*₹([0-9,]+\.\d{2})").unwrap();

    static ref TOTAL_DISCOUNT: Regex = Regex::new(r"Total Discount\s*-?\s*₹([0-9,]+\.\d{2})").unwrap();
}

/// Parse an amount, stripping `₹`, commas and whitespace.
///
/// Unparsable text yields zero.
pub fn safe_amount(value: &str) -> Decimal {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != ',' && *c != '₹' && !c.is_whitespace())
        .collect();
    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

fn first_text(re: &Regex, text: &str) -> Option<FieldValue> {
    re.captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|v| !v.is_empty())
        .map(FieldValue::Text)
}

/// Rates in order and the summed amount of every `<tax> <rate>% ₹<amount>` line.
fn tax_lines(re: &Regex, text: &str) -> Option<(Vec<Decimal>, Decimal)> {
    let matches: Vec<Captures> = re.captures_iter(text).collect();
    if matches.is_empty() {
        return None;
    }

    let rates = matches.iter().map(|caps| safe_amount(&caps[1])).collect();
    let amount = matches.iter().map(|caps| safe_amount(&caps[2])).sum();
    Some((rates, amount))
}

/// Locate every schema field the label conventions cover.
pub fn extract_patterns(text: &str) -> FieldSet {
    let mut fields = FieldSet::new();

    let labelled = [
        (Field::InvoiceNumber, &*INVOICE_NUMBER),
        (Field::InvoiceDate, &*INVOICE_DATE),
        (Field::DueDate, &*DUE_DATE),
        (Field::PlaceOfSupply, &*PLACE_OF_SUPPLY),
        (Field::PlaceOfOrigin, &*PLACE_OF_ORIGIN),
        (Field::Mobile, &*MOBILE),
        (Field::Email, &*EMAIL),
    ];
    for (field, re) in labelled {
        if let Some(value) = first_text(re, text) {
            fields.set(field, value);
        }
    }

    if let Some(caps) = CUSTOMER_DETAILS.captures(text) {
        let cleaned = CUSTOMER_TRAILER.replace_all(&caps[1], "");
        let cleaned = cleaned.trim();
        if !cleaned.is_empty() {
            fields.set(Field::CustomerDetails, FieldValue::text(cleaned));
        }
    }

    // first GSTIN belongs to the supplier, the next one to the recipient
    let mut gstins = GSTIN.captures_iter(text).map(|caps| caps[1].to_string());
    if let Some(supplier) = gstins.next() {
        fields.set(Field::GstinSupplier, FieldValue::Text(supplier));
    }
    if let Some(recipient) = gstins.next() {
        fields.set(Field::GstinRecipient, FieldValue::Text(recipient));
    }

    if let Some(caps) = TAXABLE_AMOUNT.captures(text) {
        let value = safe_amount(&caps[1]);
        fields.set(Field::TaxableValue, FieldValue::Amount(value));
        fields.set(Field::Amount, FieldValue::Amount(value));
    }

    let mut tax_amount = Decimal::ZERO;
    let mut all_rates = Vec::new();
    for (re, amount_field, rate_field) in [
        (&*CGST, Field::CgstAmount, Field::CgstRate),
        (&*SGST, Field::SgstAmount, Field::SgstRate),
        (&*IGST, Field::IgstAmount, Field::IgstRate),
    ] {
        if let Some((rates, amount)) = tax_lines(re, text) {
            tax_amount += amount;
            all_rates.extend(rates.iter().copied());
            fields.set(amount_field, FieldValue::Amount(amount));
            fields.set(rate_field, FieldValue::Rates(rates));
        }
    }
    fields.set(Field::TaxAmount, FieldValue::Amount(tax_amount));
    if !all_rates.is_empty() {
        fields.set(Field::TaxRate, FieldValue::Rates(all_rates));
    }

    if let Some(caps) = TOTAL.captures(text) {
        let value = safe_amount(&caps[1]);
        fields.set(Field::FinalAmount, FieldValue::Amount(value));
        fields.set(Field::Total, FieldValue::Amount(value));
    }

    if let Some(caps) = TOTAL_DISCOUNT.captures(text) {
        fields.set(Field::TotalDiscount, FieldValue::Amount(safe_amount(&caps[1])));
    }

    debug!(
        "Pattern extraction found {} of {} fields",
        fields.iter().filter(|(_, v)| v.is_some()).count(),
        Field::ALL.len()
    );
    fields
}

/// Deterministic extractor over known label conventions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternExtractor;

#[async_trait]
impl InvoiceExtractor for PatternExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Pattern
    }

    async fn extract(&self, _document: &Document, text: &ExtractedText) -> Result<FieldSet> {
        Ok(extract_patterns(&text.text))
    }
}
