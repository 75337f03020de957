//! Source file discovery and reading.
//!
//! Disclosure extracts arrive as delimited text or spreadsheets, one or more
//! per fiscal year, with encodings and delimiters that change over time.
//! Everything is read into a header row plus string cells; interpretation
//! happens later through the column mapper.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use calamine::{open_workbook_auto, Data, Reader};
use encoding_rs::{UTF_8, WINDOWS_1252};
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::LoadError;
use crate::normalize::excel_serial_to_date;

const TEXT_EXTENSIONS: &[&str] = &["csv", "txt", "tsv"];
const SHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls"];

/// Header row plus data rows of one source file, all cells as text.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SourceTable {
    /// 1-indexed line of a data row, counting the header as line 1.
    pub fn line_of(row_idx: usize) -> usize {
        row_idx + 2
    }
}

// =============================================================================
// DISCOVERY
// =============================================================================

fn four_digit_year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^0-9])(20[0-4][0-9])(?:[^0-9]|$)").expect("valid regex"))
}

fn two_digit_year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:fy|h-?1b)[_-]?([0-9]{2})(?:[^0-9]|$)").expect("valid regex")
    })
}

/// Fiscal year a disclosure file belongs to, from its name:
/// `LCA_Disclosure_Data_FY2024_Q4.xlsx`, `H-1B_FY14.xlsx`, `cleaned_h1b15.csv`.
pub fn year_from_file_name(name: &str) -> Option<i32> {
    if let Some(caps) = four_digit_year().captures(name) {
        return caps[1].parse().ok();
    }
    two_digit_year()
        .captures(name)
        .and_then(|caps| caps[1].parse::<i32>().ok())
        .map(|yy| 2000 + yy)
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            TEXT_EXTENSIONS.contains(&e.as_str()) || SHEET_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// All readable source files under `data_dir`, grouped by fiscal year and
/// sorted by path within a year.
pub fn discover_files(data_dir: &Path) -> Result<BTreeMap<i32, Vec<PathBuf>>, LoadError> {
    if !data_dir.is_dir() {
        return Err(LoadError::source_file(data_dir, "data directory not found"));
    }

    let mut by_year: BTreeMap<i32, Vec<PathBuf>> = BTreeMap::new();
    for entry in WalkDir::new(data_dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported(path) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        // Lock files left by spreadsheet editors.
        if name.starts_with("~$") || name.starts_with('.') {
            continue;
        }
        match year_from_file_name(&name) {
            Some(year) => by_year.entry(year).or_default().push(path.to_path_buf()),
            None => debug!(file = %path.display(), "no fiscal year in file name, ignored"),
        }
    }

    for files in by_year.values_mut() {
        files.sort();
    }
    Ok(by_year)
}

// =============================================================================
// READING
// =============================================================================

pub async fn read_table(path: &Path) -> Result<SourceTable, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if SHEET_EXTENSIONS.contains(&ext.as_str()) {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_workbook(&path))
            .await
            .map_err(|e| LoadError::source_file("<worker>", e))?
    } else {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LoadError::source_file(path, e))?;
        parse_delimited(path, &decode_text(&bytes))
    }
}

/// UTF-8 when valid, Windows-1252 otherwise. Older extracts are not UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => text.into_owned(),
        None => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

/// Pick the delimiter that splits the header line into the most fields.
pub fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or("");
    [b',', b'\t', b';', b'|']
        .into_iter()
        .max_by_key(|d| header.matches(*d as char).count())
        .filter(|d| header.contains(*d as char))
        .unwrap_or(b',')
}

pub fn parse_delimited(path: &Path, content: &str) -> Result<SourceTable, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| LoadError::source_file(path, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(LoadError::source_file(path, "no header row"));
    }

    let mut rows = Vec::new();
    let mut bad_lines = 0usize;
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(record.iter().map(|c| c.to_string()).collect()),
            Err(e) => {
                bad_lines += 1;
                debug!(line = SourceTable::line_of(idx), error = %e, "unparseable line skipped");
            }
        }
    }
    if bad_lines > 0 {
        warn!(file = %path.display(), bad_lines, "skipped unparseable lines");
    }

    Ok(SourceTable {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

/// First sheet of a workbook (xls, xlsx, xlsm).
pub fn read_workbook(path: &Path) -> Result<SourceTable, LoadError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| LoadError::source_file(path, e))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LoadError::source_file(path, "workbook has no sheets"))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| LoadError::source_file(path, e))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| LoadError::source_file(path, "sheet is empty"))?
        .iter()
        .map(cell_text)
        .collect();

    let rows: Vec<Vec<String>> = rows.map(|row| row.iter().map(cell_text).collect()).collect();
    debug!(file = %path.display(), sheet = %sheet_name, rows = rows.len(), "workbook read");

    Ok(SourceTable {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => String::from(if *b { "Y" } else { "N" }),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
    }
}

/// Integral floats lose the ".0" so codes like NAICS 541511 stay codes.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
