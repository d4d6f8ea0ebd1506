//! GST invoice schema and record types.

use std::fmt;

use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::config::ExtractionStrategy;
use super::document::Provenance;

/// Number of fields in the fixed schema.
pub const FIELD_COUNT: usize = 26;

/// A field of the fixed invoice schema, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    InvoiceNumber,
    Date,
    InvoiceDate,
    DueDate,
    Quantity,
    Amount,
    Total,
    TaxableValue,
    SgstAmount,
    CgstAmount,
    IgstAmount,
    SgstRate,
    CgstRate,
    IgstRate,
    TaxAmount,
    TaxRate,
    FinalAmount,
    TotalDiscount,
    Email,
    Mobile,
    GstinSupplier,
    GstinRecipient,
    Address,
    PlaceOfSupply,
    PlaceOfOrigin,
    CustomerDetails,
}

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Identifier-like text.
    Identifier,
    /// Date-like text.
    Date,
    /// Non-negative decimal.
    Amount,
    /// Ordered sequence of percentage rates.
    Rates,
    Email,
    /// 15-character GST identification number.
    Gstin,
    /// Free text.
    Text,
}

/// Static metadata for one schema field.
#[derive(Debug)]
pub struct FieldSpec {
    pub field: Field,
    /// Column name, also the key requested from the model.
    pub name: &'static str,
    pub kind: FieldKind,
    /// Format pattern; fields without one are checked for non-emptiness only.
    pub pattern: Option<&'static str>,
    /// Alternative keys accepted in model output.
    pub aliases: &'static [&'static str],
}

const DECIMAL_PATTERN: &str = r"^\d+(\.\d+)?$";
const GSTIN_PATTERN: &str = r"^\d{2}[A-Z]{5}\d{4}[A-Z]{1}[A-Z\d]{1}[Z]{1}[A-Z\d]{1}$";

/// The fixed schema, indexed by `Field as usize`.
pub static SCHEMA: [FieldSpec; FIELD_COUNT] = [
    FieldSpec {
        field: Field::InvoiceNumber,
        name: "Invoice No.",
        kind: FieldKind::Identifier,
        pattern: Some(r"^[A-Za-z0-9\-]+$"),
        aliases: &["invoice_number", "invoice_no", "invoice_id"],
    },
    FieldSpec {
        field: Field::Date,
        name: "Date",
        kind: FieldKind::Date,
        pattern: Some(r"^\d{2}/\d{2}/\d{4}$"),
        aliases: &[],
    },
    FieldSpec {
        field: Field::InvoiceDate,
        name: "Invoice Date",
        kind: FieldKind::Date,
        pattern: None,
        aliases: &["invoice_date"],
    },
    FieldSpec {
        field: Field::DueDate,
        name: "Due Date",
        kind: FieldKind::Date,
        pattern: None,
        aliases: &["due_date"],
    },
    FieldSpec {
        field: Field::Quantity,
        name: "Quantity",
        kind: FieldKind::Amount,
        pattern: Some(DECIMAL_PATTERN),
        aliases: &["qty", "qantity"],
    },
    FieldSpec {
        field: Field::Amount,
        name: "Amount",
        kind: FieldKind::Amount,
        pattern: Some(DECIMAL_PATTERN),
        aliases: &[],
    },
    FieldSpec {
        field: Field::Total,
        name: "Total",
        kind: FieldKind::Amount,
        pattern: Some(DECIMAL_PATTERN),
        aliases: &[],
    },
    FieldSpec {
        field: Field::TaxableValue,
        name: "Taxable Value",
        kind: FieldKind::Amount,
        pattern: None,
        aliases: &["taxable_value", "taxable_amount"],
    },
    FieldSpec {
        field: Field::SgstAmount,
        name: "SGST Amount",
        kind: FieldKind::Amount,
        pattern: None,
        aliases: &["sgst_amount"],
    },
    FieldSpec {
        field: Field::CgstAmount,
        name: "CGST Amount",
        kind: FieldKind::Amount,
        pattern: None,
        aliases: &["cgst_amount"],
    },
    FieldSpec {
        field: Field::IgstAmount,
        name: "IGST Amount",
        kind: FieldKind::Amount,
        pattern: None,
        aliases: &["igst_amount"],
    },
    FieldSpec {
        field: Field::SgstRate,
        name: "SGST Rate",
        kind: FieldKind::Rates,
        pattern: None,
        aliases: &["sgst_rate", "sgst_rates"],
    },
    FieldSpec {
        field: Field::CgstRate,
        name: "CGST Rate",
        kind: FieldKind::Rates,
        pattern: None,
        aliases: &["cgst_rate", "cgst_rates"],
    },
    FieldSpec {
        field: Field::IgstRate,
        name: "IGST Rate",
        kind: FieldKind::Rates,
        pattern: None,
        aliases: &["igst_rate", "igst_rates"],
    },
    FieldSpec {
        field: Field::TaxAmount,
        name: "Tax Amount",
        kind: FieldKind::Amount,
        pattern: None,
        aliases: &["tax_amount"],
    },
    FieldSpec {
        field: Field::TaxRate,
        name: "Tax Rate",
        kind: FieldKind::Rates,
        pattern: None,
        aliases: &["tax_rate"],
    },
    FieldSpec {
        field: Field::FinalAmount,
        name: "Final Amount",
        kind: FieldKind::Amount,
        pattern: None,
        aliases: &["final_amount", "grand_total"],
    },
    FieldSpec {
        field: Field::TotalDiscount,
        name: "Total Discount",
        kind: FieldKind::Amount,
        pattern: None,
        aliases: &["total_discount", "discount"],
    },
    FieldSpec {
        field: Field::Email,
        name: "Email",
        kind: FieldKind::Email,
        pattern: Some(r"^[\w\.-]+@[\w\.-]+\.\w+$"),
        aliases: &["supplier_email", "email_address"],
    },
    FieldSpec {
        field: Field::Mobile,
        name: "Mobile",
        kind: FieldKind::Text,
        pattern: None,
        aliases: &["supplier_mobile_number", "mobile_number", "phone"],
    },
    FieldSpec {
        field: Field::GstinSupplier,
        name: "GSTIN Supplier",
        kind: FieldKind::Gstin,
        pattern: Some(GSTIN_PATTERN),
        aliases: &["gstin_supplier", "supplier_gstin", "gstin"],
    },
    FieldSpec {
        field: Field::GstinRecipient,
        name: "GSTIN Recipient",
        kind: FieldKind::Gstin,
        pattern: Some(GSTIN_PATTERN),
        aliases: &["gstin_recipient", "recipient_gstin", "customer_gstin"],
    },
    FieldSpec {
        field: Field::Address,
        name: "Address",
        kind: FieldKind::Text,
        pattern: None,
        aliases: &["supplier_address"],
    },
    FieldSpec {
        field: Field::PlaceOfSupply,
        name: "Place of Supply",
        kind: FieldKind::Text,
        pattern: None,
        aliases: &["place_of_supply"],
    },
    FieldSpec {
        field: Field::PlaceOfOrigin,
        name: "Place of Origin",
        kind: FieldKind::Text,
        pattern: None,
        aliases: &["place_of_origin"],
    },
    FieldSpec {
        field: Field::CustomerDetails,
        name: "Customer Details",
        kind: FieldKind::Text,
        pattern: None,
        aliases: &["customer_details", "customer_name"],
    },
];

impl Field {
    /// All fields in schema order.
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::InvoiceNumber,
        Field::Date,
        Field::InvoiceDate,
        Field::DueDate,
        Field::Quantity,
        Field::Amount,
        Field::Total,
        Field::TaxableValue,
        Field::SgstAmount,
        Field::CgstAmount,
        Field::IgstAmount,
        Field::SgstRate,
        Field::CgstRate,
        Field::IgstRate,
        Field::TaxAmount,
        Field::TaxRate,
        Field::FinalAmount,
        Field::TotalDiscount,
        Field::Email,
        Field::Mobile,
        Field::GstinSupplier,
        Field::GstinRecipient,
        Field::Address,
        Field::PlaceOfSupply,
        Field::PlaceOfOrigin,
        Field::CustomerDetails,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn spec(self) -> &'static FieldSpec {
        &SCHEMA[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn kind(self) -> FieldKind {
        self.spec().kind
    }

    /// Look up a field by column name, normalized name, or alias.
    pub fn from_name(name: &str) -> Option<Field> {
        if let Some(spec) = SCHEMA.iter().find(|s| s.name == name) {
            return Some(spec.field);
        }

        let wanted = normalize_key(name);
        if wanted.is_empty() {
            return None;
        }
        SCHEMA
            .iter()
            .find(|s| {
                normalize_key(s.name) == wanted
                    || s.aliases.iter().any(|a| normalize_key(a) == wanted)
            })
            .map(|s| s.field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Lowercase and drop everything but letters and digits.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// A raw field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Amount(Decimal),
    Rates(Vec<Decimal>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    /// Numeric value, if this is an amount.
    pub fn as_amount(&self) -> Option<Decimal> {
        match self {
            FieldValue::Amount(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Amount(d) => write!(f, "{}", d),
            FieldValue::Rates(rates) => {
                let joined = rates
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                f.write_str(&joined)
            }
        }
    }
}

/// Exactly one value slot per schema field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    values: [Option<FieldValue>; FIELD_COUNT],
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values[field.index()].as_ref()
    }

    pub fn set(&mut self, field: Field, value: FieldValue) {
        self.values[field.index()] = Some(value);
    }

    pub fn with(mut self, field: Field, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }

    pub fn is_present(&self, field: Field) -> bool {
        self.values[field.index()].is_some()
    }

    pub fn amount(&self, field: Field) -> Option<Decimal> {
        self.get(field).and_then(FieldValue::as_amount)
    }

    /// Printed value; absent fields print as the empty string.
    pub fn display(&self, field: Field) -> String {
        self.get(field).map(|v| v.to_string()).unwrap_or_default()
    }

    /// Iterate over every field in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, Option<&FieldValue>)> + '_ {
        Field::ALL.iter().map(move |&f| (f, self.get(f)))
    }
}

impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELD_COUNT))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.name(), &value)?;
        }
        map.end()
    }
}

/// Per-field confidence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "High Confidence",
            ConfidenceTier::Medium => "Medium Confidence",
            ConfidenceTier::Low => "Low Confidence",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Document-level trust label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrustVerdict {
    Trusted,
    Untrusted,
}

impl TrustVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustVerdict::Trusted => "Trusted",
            TrustVerdict::Untrusted => "Untrusted",
        }
    }
}

impl fmt::Display for TrustVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldCheck {
    pub field: Field,
    pub valid: bool,
    pub tier: ConfidenceTier,
}

/// One document's extracted fields with their confidence and trust.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRecord {
    /// Name of the source document.
    pub document: String,

    /// How the text was acquired.
    pub source: Provenance,

    /// Extraction strategy that produced the fields.
    pub strategy: ExtractionStrategy,

    pub fields: FieldSet,

    /// One check per schema field, in schema order.
    pub confidence: Vec<FieldCheck>,

    /// Averaged trust score, when the scoring policy produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<f64>,

    pub verdict: TrustVerdict,
}

impl InvoiceRecord {
    /// Confidence labels joined the way the export column shows them.
    pub fn confidence_summary(&self) -> String {
        self.confidence
            .iter()
            .map(|c| c.tier.label())
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn tier(&self, field: Field) -> ConfidenceTier {
        self.confidence[field.index()].tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn test_schema_order_matches_enum() {
        for (i, spec) in SCHEMA.iter().enumerate() {
            assert_eq!(spec.field.index(), i, "{} out of place", spec.name);
            assert_eq!(Field::ALL[i], spec.field);
        }
    }

    #[test]
    fn test_field_from_name() {
        assert_eq!(Field::from_name("Invoice No."), Some(Field::InvoiceNumber));
        assert_eq!(Field::from_name("invoice_number"), Some(Field::InvoiceNumber));
        assert_eq!(Field::from_name("INVOICE NO"), Some(Field::InvoiceNumber));
        assert_eq!(Field::from_name("gstin_supplier"), Some(Field::GstinSupplier));
        assert_eq!(Field::from_name("place of supply"), Some(Field::PlaceOfSupply));
        assert_eq!(Field::from_name("round_off"), None);
        assert_eq!(Field::from_name(""), None);
    }

    #[test]
    fn test_field_value_display() {
        let rates = FieldValue::Rates(vec![
            Decimal::from_str("9").unwrap(),
            Decimal::from_str("2.5").unwrap(),
        ]);
        assert_eq!(rates.to_string(), "9, 2.5");
        assert_eq!(FieldValue::Amount(Decimal::new(120050, 2)).to_string(), "1200.50");
    }

    #[test]
    fn test_field_set_absent_prints_empty() {
        let set = FieldSet::new().with(Field::Email, FieldValue::text("a@b.com"));
        assert_eq!(set.display(Field::Email), "a@b.com");
        assert_eq!(set.display(Field::Address), "");
        assert!(!set.is_present(Field::Address));
        assert_eq!(set.iter().count(), FIELD_COUNT);
    }

    #[test]
    fn test_field_set_serializes_every_field() {
        let set = FieldSet::new().with(Field::InvoiceNumber, FieldValue::text("INV-1"));
        let json = serde_json::to_value(&set).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), FIELD_COUNT);
        assert_eq!(obj["Invoice No."], "INV-1");
        assert!(obj["Email"].is_null());
    }
}
