//! Process command - extract fields from a single invoice file.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::info;

use gstx_core::aggregate::ResultTable;
use gstx_core::export::write_csv_to;
use gstx_core::{Document, InvoiceRecord, Pipeline, TrustVerdict};

use super::{ScorerArg, StrategyArg, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF, image or text)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Extraction strategy (overrides config)
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Trust scorer (overrides config)
    #[arg(long, value_enum)]
    scorer: Option<ScorerArg>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(strategy) = args.strategy {
        config.extraction.strategy = strategy.into();
    }
    if let Some(scorer) = args.scorer {
        config.extraction.scorer = Some(scorer.into());
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let pipeline = Pipeline::from_config(&config)?;

    info!("Processing file: {}", args.input.display());
    let document = Document::from_path(&args.input)?;
    let record = pipeline
        .process_document(document)
        .await
        .map_err(|message| anyhow::anyhow!(message))?;

    let output = format_record(&record, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    info!("Processed {} in {:?}", record.document, start.elapsed());
    Ok(())
}

fn format_record(record: &InvoiceRecord, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        OutputFormat::Csv => {
            let mut table = ResultTable::new();
            table.push(record.clone());
            let mut buf = Vec::new();
            write_csv_to(&mut buf, &table)?;
            Ok(String::from_utf8(buf)?)
        }
        OutputFormat::Text => Ok(format_record_text(record)),
    }
}

fn format_record_text(record: &InvoiceRecord) -> String {
    let mut output = String::new();

    output.push_str(&format!("Document: {}\n", record.document));
    output.push_str(&format!(
        "Source: {}  Strategy: {}\n\n",
        record.source, record.strategy
    ));

    for check in &record.confidence {
        let value = record.fields.display(check.field);
        let value = if value.is_empty() { "-".to_string() } else { value };
        output.push_str(&format!(
            "  {:<18} {:<40} {}\n",
            check.field.name(),
            value,
            check.tier.label()
        ));
    }

    output.push('\n');
    let verdict = match record.verdict {
        TrustVerdict::Trusted => style(record.verdict.as_str()).green(),
        TrustVerdict::Untrusted => style(record.verdict.as_str()).red(),
    };
    match record.trust_score {
        Some(score) => output.push_str(&format!("Trust: {} ({:.2})\n", verdict, score)),
        None => output.push_str(&format!("Trust: {}\n", verdict)),
    }

    output
}
