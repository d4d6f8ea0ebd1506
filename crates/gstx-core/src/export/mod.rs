//! Spreadsheet, CSV and JSON exports of the result table.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use calamine::{Reader, Xlsx, open_workbook};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook};
use tracing::info;

use crate::aggregate::{BatchMetrics, ResultTable, columns, row};
use crate::error::ExportError;
use crate::models::invoice::{Field, FieldValue};

/// Worksheet holding the result table.
pub const SHEET_NAME: &str = "Invoices";

/// Write the table as CSV to any writer.
pub fn write_csv_to<W: Write>(writer: W, table: &ResultTable) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(columns())?;
    for record in table.records() {
        wtr.write_record(row(record))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the table to a CSV file.
pub fn write_csv(path: &Path, table: &ResultTable) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_csv_to(file, table)?;
    info!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Read a CSV export back as header and rows.
pub fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), ExportError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

/// Write the table to an `.xlsx` workbook; amounts are stored as numbers.
pub fn write_xlsx(path: &Path, table: &ResultTable) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, name) in columns().iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, &header)?;
    }

    for (i, record) in table.records().iter().enumerate() {
        let r = i as u32 + 1;
        for (col, value) in row(record).iter().enumerate() {
            let col = col as u16;
            // column 0 is the document name; schema fields follow in order
            let amount = (col as usize)
                .checked_sub(1)
                .and_then(|idx| Field::ALL.get(idx))
                .and_then(|&f| record.fields.get(f))
                .and_then(FieldValue::as_amount)
                .and_then(|d| d.to_f64());

            match amount {
                Some(number) => {
                    sheet.write_number(r, col, number)?;
                }
                None if !value.is_empty() => {
                    sheet.write_string(r, col, value)?;
                }
                None => {}
            }
        }
    }

    sheet.autofit();
    workbook.save(path)?;
    info!("Saved {} rows to {}", table.len(), path.display());
    Ok(())
}

/// Read the invoice sheet of an `.xlsx` export as printed rows, header first.
pub fn read_xlsx(path: &Path) -> Result<Vec<Vec<String>>, ExportError> {
    let mut workbook: Xlsx<BufReader<File>> =
        open_workbook(path).map_err(|e: calamine::XlsxError| ExportError::XlsxRead(e.to_string()))?;
    let range = workbook
        .worksheet_range(SHEET_NAME)
        .map_err(|e| ExportError::XlsxRead(e.to_string()))?;

    Ok(range
        .rows()
        .map(|cells| cells.iter().map(|c| c.to_string()).collect())
        .collect())
}

/// Write per-field accuracy as CSV.
pub fn write_metrics_csv(path: &Path, metrics: &BatchMetrics) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["Field", "Correct", "Total", "Accuracy Rate"])?;
    for (field, label) in metrics.accuracy_rates() {
        let tally = metrics.tally(field);
        wtr.write_record([
            field.name().to_string(),
            tally.correct.to_string(),
            tally.total.to_string(),
            label,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the records as a JSON array.
pub fn write_json(path: &Path, table: &ResultTable) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(table.records()).map_err(std::io::Error::other)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::aggregate::tests::record;
    use crate::models::invoice::FieldSet;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn sample_table() -> ResultTable {
        let first = FieldSet::new()
            .with(Field::InvoiceNumber, FieldValue::text("INV-1"))
            .with(Field::Email, FieldValue::text("a@b.com"))
            .with(Field::Address, FieldValue::text("12, Market Road \"East\""))
            .with(Field::FinalAmount, FieldValue::Amount(Decimal::from_str("1180.50").unwrap()))
            .with(
                Field::TaxRate,
                FieldValue::Rates(vec![Decimal::from(9), Decimal::from(9)]),
            );
        let second = FieldSet::new().with(Field::InvoiceNumber, FieldValue::text("INV-2"));
        aggregate(vec![record("a.pdf", first), record("b.pdf", second)]).0
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = sample_table();

        write_csv(&path, &table).unwrap();
        let (headers, rows) = read_csv(&path).unwrap();

        assert_eq!(headers, columns());
        assert_eq!(rows, table.rows());
    }

    #[test]
    fn test_xlsx_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let table = sample_table();

        write_xlsx(&path, &table).unwrap();
        let read = read_xlsx(&path).unwrap();

        assert_eq!(read[0], columns());
        let expected = table.rows();
        assert_eq!(read.len(), expected.len() + 1);
        for (got, want) in read[1..].iter().zip(&expected) {
            for (col, (g, w)) in got.iter().zip(want).enumerate() {
                match (f64::from_str(g), f64::from_str(w)) {
                    (Ok(a), Ok(b)) => assert!((a - b).abs() < 1e-9, "column {}", col),
                    _ => assert_eq!(g, w, "column {}", col),
                }
            }
        }
    }

    #[test]
    fn test_metrics_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let (_, metrics) = aggregate(vec![]);

        write_metrics_csv(&path, &metrics).unwrap();
        let (headers, rows) = read_csv(&path).unwrap();

        assert_eq!(headers, vec!["Field", "Correct", "Total", "Accuracy Rate"]);
        assert_eq!(rows.len(), Field::ALL.len());
        assert_eq!(rows[0], vec!["Invoice No.", "0", "0", "N/A"]);
    }

    #[test]
    fn test_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        write_json(&path, &sample_table()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(value[0]["document"], "a.pdf");
        assert_eq!(value[0]["fields"]["Invoice No."], "INV-1");
        assert!(value[1]["fields"]["Email"].is_null());
    }
}
