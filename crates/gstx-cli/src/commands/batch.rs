//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use gstx_core::aggregate::BatchReport;
use gstx_core::error::ExportError;
use gstx_core::export::{write_csv, write_json, write_metrics_csv, write_xlsx};
use gstx_core::{Document, Pipeline};

use super::{ScorerArg, StrategyArg, is_supported, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files, directories or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory for the exports (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Export file name without extension (overrides config)
    #[arg(long)]
    name: Option<String>,

    /// Export formats
    #[arg(short, long, value_enum, value_delimiter = ',', default_values = ["xlsx", "csv"])]
    format: Vec<ExportFormat>,

    /// Also write per-field accuracy to a CSV
    #[arg(long)]
    metrics: bool,

    /// Number of documents processed concurrently (overrides config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Extraction strategy (overrides config)
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Trust scorer (overrides config)
    #[arg(long, value_enum)]
    scorer: Option<ScorerArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// Excel workbook
    Xlsx,
    /// Comma-separated values
    Csv,
    /// JSON array of records
    Json,
}

impl ExportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(strategy) = args.strategy {
        config.extraction.strategy = strategy.into();
    }
    if let Some(scorer) = args.scorer {
        config.extraction.scorer = Some(scorer.into());
    }
    if let Some(jobs) = args.jobs {
        config.extraction.jobs = jobs;
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(name) = &args.name {
        config.output.file_stem = name.clone();
    }

    // configuration problems abort before any document is read
    let pipeline = Pipeline::from_config(&config)?;

    let files = collect_files(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for: {}", args.inputs.join(" "));
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    let mut documents = Vec::with_capacity(files.len());
    let mut unreadable = Vec::new();
    for path in &files {
        match Document::from_path(path) {
            Ok(document) => documents.push(document),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                unreadable.push((path.display().to_string(), e.to_string()));
            }
        }
    }

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let report = pipeline
        .run_with(documents, |name, _| {
            pb.set_message(name.to_string());
            pb.inc(1);
        })
        .await;
    pb.finish_with_message("Complete");

    // export failures are reported, the in-memory results are still printed
    match fs::create_dir_all(&config.output.dir) {
        Ok(()) => export_report(&report, &args, &config.output.dir, &config.output.file_stem),
        Err(e) => {
            error!("Failed to create {}: {}", config.output.dir.display(), e);
            eprintln!(
                "{} Failed to write exports to {}: {}",
                style("✗").red(),
                config.output.dir.display(),
                e
            );
        }
    }

    print_summary(&report, &unreadable);
    Ok(())
}

fn export_report(report: &BatchReport, args: &BatchArgs, dir: &Path, stem: &str) {
    for format in &args.format {
        let path = dir.join(format!("{}.{}", stem, format.extension()));
        let result = match format {
            ExportFormat::Xlsx => write_xlsx(&path, &report.table),
            ExportFormat::Csv => write_csv(&path, &report.table),
            ExportFormat::Json => write_json(&path, &report.table),
        };
        report_export(&path, result);
    }

    if args.metrics {
        let path = dir.join(format!("{}_metrics.csv", stem));
        report_export(&path, write_metrics_csv(&path, &report.metrics));
    }
}

/// Expand paths, directories and glob patterns into supported files, in order.
fn collect_files(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_supported(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            let matched = glob(input)?.filter_map(|r| r.ok()).filter(|p| is_supported(p));
            files.extend(matched);
        }
    }

    debug!("Collected {} input files", files.len());
    Ok(files)
}

fn report_export(path: &Path, result: Result<(), ExportError>) {
    match result {
        Ok(()) => println!("{} Saved {}", style("✓").green(), path.display()),
        Err(e) => {
            error!("Failed to write {}: {}", path.display(), e);
            eprintln!(
                "{} Failed to write {}: {}",
                style("✗").red(),
                path.display(),
                e
            );
        }
    }
}

fn print_summary(report: &BatchReport, unreadable: &[(String, String)]) {
    println!();
    println!(
        "{} Processed {} files in {:.2} seconds",
        style("✓").green(),
        report.total_files + unreadable.len(),
        report.elapsed.as_secs_f64()
    );
    println!(
        "   {} successful, {} failed",
        style(report.successful()).green(),
        style(report.failures.len() + unreadable.len()).red()
    );
    println!(
        "   {} trusted, {} untrusted",
        style(report.metrics.trusted).green(),
        style(report.metrics.untrusted).yellow()
    );

    println!();
    println!("{}", style("Accuracy rates:").bold());
    for (field, label) in report.metrics.accuracy_rates() {
        println!("  {:<18} {}", field.name(), label);
    }

    let failures: Vec<(&str, &str)> = report
        .failures
        .iter()
        .map(|f| (f.document.as_str(), f.message.as_str()))
        .chain(unreadable.iter().map(|(d, m)| (d.as_str(), m.as_str())))
        .collect();

    if !failures.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for (document, message) in failures {
            println!("  - {}: {}", document, message);
        }
    }
}
