//! NAICS industry lookup table.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::batch::{BatchReport, BatchWriter};
use crate::error::LoadError;
use crate::models::NaicsEntry;
use crate::source::{decode_text, sniff_delimiter};
use crate::store::Store;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "NAICS_CODE", alias = "code", alias = "naics")]
    naics_code: String,
    #[serde(default, alias = "INDUSTRY_NAME", alias = "industry", alias = "title")]
    industry_name: Option<String>,
    #[serde(default, alias = "SECTOR")]
    sector: Option<String>,
    #[serde(default, alias = "INDUSTRY_CATEGORY", alias = "category")]
    industry_category: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse lookup rows. Codes exported as floats ("541511.0") are restored;
/// a repeated code keeps its last row.
pub fn parse_naics(content: &str) -> Result<Vec<NaicsEntry>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut entries: Vec<NaicsEntry> = Vec::new();
    for (i, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.map_err(|e| LoadError::RowParse {
            line: i + 2,
            reason: e.to_string(),
        })?;
        let code = row.naics_code.trim();
        let code = code.strip_suffix(".0").unwrap_or(code);
        if code.is_empty() {
            continue;
        }
        let entry = NaicsEntry {
            naics_code: code.to_string(),
            industry_name: clean(row.industry_name),
            sector: clean(row.sector),
            industry_category: clean(row.industry_category),
        };
        match index.get(code) {
            Some(&at) => entries[at] = entry,
            None => {
                index.insert(code.to_string(), entries.len());
                entries.push(entry);
            }
        }
    }
    Ok(entries)
}

/// Read the lookup file and upsert it.
pub async fn load_naics<S: Store + ?Sized>(
    store: &S,
    path: &Path,
    batch_size: usize,
) -> Result<BatchReport, LoadError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LoadError::source_file(path, e))?;
    let entries = parse_naics(&decode_text(&bytes)).map_err(|e| LoadError::source_file(path, e))?;
    info!(path = %path.display(), codes = entries.len(), "loading NAICS lookup");

    let report = BatchWriter::new(store, batch_size).write(&entries).await;
    info!(written = report.written, failed = report.failed_rows(), "NAICS lookup loaded");
    Ok(report)
}
