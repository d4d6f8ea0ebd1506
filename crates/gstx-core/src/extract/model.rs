//! Extraction delegated to a generative model returning JSON.

use std::str::FromStr;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::json::parse_json_object;
use super::{InvoiceExtractor, Result};
use crate::llm::{ChatMessage, ContentPart, ImageUrl, MessageContent, ModelClient};
use crate::models::config::ExtractionStrategy;
use crate::models::document::{Document, ExtractedText};
use crate::models::invoice::{Field, FieldKind, FieldSet, FieldValue, SCHEMA};

const SYSTEM_PROMPT: &str = "You are a helpful and accurate assistant.";

/// Prompt listing every schema field by its exact name.
pub fn build_prompt(text: &str) -> String {
    let mut prompt = String::from(
        "You are an expert and have best knowledge of invoices. \
         Extract the following fields from the invoice data:\n",
    );
    for spec in SCHEMA.iter() {
        prompt.push_str("- ");
        prompt.push_str(spec.name);
        prompt.push('\n');
    }
    prompt.push_str(
        "\n**Provide the output strictly in valid JSON format with no additional text, \
         explanations, or comments. Ensure all keys are correctly spelled and correspond \
         to the field names above. Use null for fields that are not present. \
         Do not include any trailing commas or syntax errors.**\n\n\
         Here is the invoice data:\n",
    );
    prompt.push_str(text);
    prompt
}

/// Map a model JSON object onto the schema.
///
/// Keys matching a column name exactly win over normalized or alias matches;
/// unknown keys are ignored.
pub fn fields_from_json(object: &Map<String, Value>) -> FieldSet {
    let mut fields = FieldSet::new();

    let exact = object
        .iter()
        .filter(|(key, _)| SCHEMA.iter().any(|s| s.name == key.as_str()));
    let fuzzy = object
        .iter()
        .filter(|(key, _)| !SCHEMA.iter().any(|s| s.name == key.as_str()));

    for (key, value) in exact.chain(fuzzy) {
        let Some(field) = Field::from_name(key) else {
            debug!("Ignoring unknown key in model output: {}", key);
            continue;
        };
        if fields.is_present(field) {
            continue;
        }
        if let Some(value) = convert(field, value) {
            fields.set(field, value);
        }
    }
    fields
}

fn convert(field: Field, value: &Value) -> Option<FieldValue> {
    if is_blank(value) {
        return None;
    }

    let parsed = match field.kind() {
        FieldKind::Amount => parse_amount(value).map(FieldValue::Amount),
        FieldKind::Rates => parse_rates(value).map(FieldValue::Rates),
        _ => None,
    };

    // values that do not parse stay as text so validation can still judge them
    Some(parsed.unwrap_or_else(|| FieldValue::Text(value_text(value))))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_blank),
        _ => false,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !is_blank(v))
            .map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && *c != '₹').collect();
            parse_decimal(&cleaned)
        }
        _ => None,
    }
}

fn parse_rate(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim().trim_end_matches('%')),
        _ => None,
    }
}

fn parse_rates(value: &Value) -> Option<Vec<Decimal>> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !is_blank(v)).map(parse_rate).collect(),
        Value::String(s) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| parse_decimal(part.trim_end_matches('%')))
            .collect(),
        other => parse_rate(other).map(|rate| vec![rate]),
    }
}

/// Extractor that prompts a model for JSON and maps it onto the schema.
pub struct ModelExtractor {
    client: ModelClient,
    send_images: bool,
}

impl ModelExtractor {
    pub fn new(client: ModelClient, send_images: bool) -> Self {
        Self { client, send_images }
    }

    fn user_message(&self, document: &Document, text: &str) -> ChatMessage {
        let prompt = build_prompt(text);
        if !(self.send_images && document.media_type().is_image()) {
            return ChatMessage::user(MessageContent::Text(prompt));
        }

        let url = format!(
            "data:{};base64,{}",
            document.media_type().mime(),
            STANDARD.encode(document.data())
        );
        ChatMessage::user(MessageContent::Parts(vec![
            ContentPart::Text { text: prompt },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            },
        ]))
    }
}

#[async_trait]
impl InvoiceExtractor for ModelExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Model
    }

    async fn extract(&self, document: &Document, text: &ExtractedText) -> Result<FieldSet> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            self.user_message(document, &text.text),
        ];

        let raw = self.client.complete(messages).await?;
        info!("Raw extracted data for {}: {}", document.name(), raw);

        let object = parse_json_object(&raw)?;
        Ok(fields_from_json(&object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::llm::tests::{ScriptedTransport, chat_body};
    use crate::models::config::ModelConfig;
    use crate::models::document::{MediaType, Provenance};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_prompt_lists_every_field() {
        let prompt = build_prompt("INVOICE TEXT");
        for spec in SCHEMA.iter() {
            assert!(prompt.contains(&format!("- {}\n", spec.name)), "{}", spec.name);
        }
        assert!(prompt.ends_with("INVOICE TEXT"));
        assert!(prompt.contains("strictly in valid JSON"));
    }

    #[test]
    fn test_fields_from_json_matching() {
        let object = json!({
            "invoice_number": "ALIAS-1",
            "Invoice No.": "EXACT-1",
            "gstin supplier": "22AAAAA0000A1Z5",
            "Taxable Value": "₹1,000.50",
            "Final Amount": 1180.5,
            "CGST Rate": [9, "9%"],
            "Tax Rate": "9%, 9%",
            "Email": "",
            "Due Date": null,
            "Quantity": "two",
            "Round Off": 0.2
        });
        let fields = fields_from_json(object.as_object().unwrap());

        assert_eq!(fields.display(Field::InvoiceNumber), "EXACT-1");
        assert_eq!(fields.display(Field::GstinSupplier), "22AAAAA0000A1Z5");
        assert_eq!(fields.amount(Field::TaxableValue), Some(dec("1000.50")));
        assert_eq!(fields.amount(Field::FinalAmount), Some(dec("1180.5")));
        assert_eq!(fields.get(Field::CgstRate), Some(&FieldValue::Rates(vec![dec("9"), dec("9")])));
        assert_eq!(fields.display(Field::TaxRate), "9, 9");
        assert!(!fields.is_present(Field::Email));
        assert!(!fields.is_present(Field::DueDate));
        assert_eq!(fields.get(Field::Quantity), Some(&FieldValue::text("two")));
    }

    fn extracted(text: &str) -> ExtractedText {
        ExtractedText::accepted(text.to_string(), Provenance::TextLayer, Vec::new())
    }

    #[tokio::test]
    async fn test_extract_parses_prose_wrapped_json() {
        let body = chat_body("Here you go:\n{\"Invoice No.\": \"INV-9\", \"Total\": \"118.00\"}\nThanks");
        let transport = ScriptedTransport::new(vec![(200, body)]);
        let extractor = ModelExtractor::new(
            ModelClient::new(Box::new(transport), &ModelConfig::default()),
            false,
        );
        let doc = Document::new("a.pdf", MediaType::Pdf, Vec::new());

        let fields = extractor.extract(&doc, &extracted("text")).await.unwrap();
        assert_eq!(fields.display(Field::InvoiceNumber), "INV-9");
        assert_eq!(fields.amount(Field::Total), Some(dec("118.00")));
    }

    #[tokio::test]
    async fn test_extract_without_json_is_named_error() {
        let transport = ScriptedTransport::new(vec![(200, chat_body("Sorry, I cannot help."))]);
        let extractor = ModelExtractor::new(
            ModelClient::new(Box::new(transport), &ModelConfig::default()),
            false,
        );
        let doc = Document::new("b.pdf", MediaType::Pdf, Vec::new());

        let err = extractor.extract(&doc, &extracted("text")).await.unwrap_err();
        assert!(matches!(err, ExtractionError::NoJson));
    }

    #[tokio::test]
    async fn test_image_documents_attach_data_url() {
        let transport = ScriptedTransport::new(vec![(200, chat_body("{}"))]);
        let last = transport.last_request.clone();
        let extractor = ModelExtractor::new(
            ModelClient::new(Box::new(transport), &ModelConfig::default()),
            true,
        );
        let doc = Document::new("scan.png", MediaType::Png, vec![1, 2, 3]);

        extractor.extract(&doc, &extracted("ocr text")).await.unwrap();

        let body = last.lock().unwrap().clone().unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );
    }
}
