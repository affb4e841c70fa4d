use crate::{Error, Result};
use chrono::{NaiveDate, Utc};
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// One record of a table, field order preserved
pub type Row = serde_json::Map<String, Value>;

pub const DEFAULT_SHEET_LABEL: &str = "Sheet1";

/// Longest text Excel keeps in one cell
pub const MAX_CELL_CHARS: usize = 32_767;

/// Knobs for column auto-sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Hard cap so one giant cell doesn't make the column a mile wide
    pub max_column_width: usize,
    /// Extra breathing room added to the longest text in a column
    pub column_padding: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_column_width: 50,
            column_padding: 2,
        }
    }
}

/// Input for a multi-sheet export: a tab label and its rows
#[derive(Debug, Clone, PartialEq)]
pub struct SheetData {
    pub label: String,
    pub rows: Vec<Row>,
}

impl SheetData {
    pub fn new(label: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            label: label.into(),
            rows,
        }
    }
}

/// A sheet ready to be written: rows plus the columns and widths derived from them
#[derive(Debug, Clone)]
pub struct ExportSheet<'a> {
    pub label: &'a str,
    pub rows: &'a [Row],
    /// Column keys in the order they first show up across the rows
    pub columns: Vec<String>,
    /// Width hint per column, same order as `columns`
    pub widths: Vec<usize>,
}

impl<'a> ExportSheet<'a> {
    pub fn new(label: &'a str, rows: &'a [Row], options: &ExportOptions) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for row in rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        let widths = columns
            .iter()
            .map(|column| column_width(column, rows, options))
            .collect();

        Self {
            label,
            rows,
            columns,
            widths,
        }
    }
}

/// What an export call ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Nothing to export, no file produced
    Skipped,
    Delivered {
        file_name: String,
        sheets: Vec<String>,
    },
}

impl ExportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ExportOutcome::Delivered { .. })
    }
}

/// Where finished workbooks go
///
/// In a browser this is "trigger a download". Here it's whatever the host
/// wants: a directory, an HTTP response body, a test buffer.
pub trait DownloadSink {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<()>;
}

impl<T: DownloadSink + ?Sized> DownloadSink for &T {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        (**self).deliver(file_name, bytes)
    }
}

/// Saves workbooks into a directory, replacing files with the same name
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(file_name);
        fs::write(&path, bytes)?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// Keeps delivered files in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, oldest first
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let mut files = self.files.lock().map_err(|_| {
            Error::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory sink lock poisoned",
            ))
        })?;
        files.push((file_name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Ordered source-field → display-name pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pairs: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `push`
    pub fn with(mut self, source: impl Into<String>, display: impl Into<String>) -> Self {
        self.push(source, display);
        self
    }

    pub fn push(&mut self, source: impl Into<String>, display: impl Into<String>) {
        self.pairs.push((source.into(), display.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(s, d)| (s.as_str(), d.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Parse a `source=Display Name` pair
    pub fn parse_pair(input: &str) -> Result<(String, String)> {
        match input.split_once('=') {
            Some((source, display)) if !source.trim().is_empty() && !display.trim().is_empty() => {
                Ok((source.trim().to_string(), display.trim().to_string()))
            }
            _ => Err(Error::ConfigError(format!(
                "Invalid column mapping '{}', expected source=Display",
                input
            ))),
        }
    }
}

impl<S: Into<String>, D: Into<String>> FromIterator<(S, D)> for ColumnMapping {
    fn from_iter<I: IntoIterator<Item = (S, D)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (source, display) in iter {
            mapping.push(source, display);
        }
        mapping
    }
}

/// Keep only the mapped fields, renamed, in mapping order
///
/// A mapped field that a row doesn't have comes out as `null` so every row
/// still has the same columns.
pub fn remap_columns(rows: &[Row], mapping: &ColumnMapping) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            let mut mapped = Row::new();
            for (source, display) in mapping.iter() {
                let value = row.get(source).cloned().unwrap_or(Value::Null);
                mapped.insert(display.to_string(), value);
            }
            mapped
        })
        .collect()
}

/// Turn typed records into rows via their serde representation
pub fn rows_from_records<T: Serialize>(records: &[T]) -> Result<Vec<Row>> {
    records
        .iter()
        .map(|record| match serde_json::to_value(record)? {
            Value::Object(row) => Ok(row),
            other => Err(Error::InvalidRecord(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        })
        .collect()
}

/// Parse a JSON array of objects into rows
pub fn parse_rows(json: &str) -> Result<Vec<Row>> {
    let values: Vec<Value> = serde_json::from_str(json)?;
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Object(row) => Ok(row),
            other => Err(Error::InvalidRecord(format!(
                "row {} is {}, not an object",
                i,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Text a cell shows for `value`; `null` shows nothing
pub fn cell_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(number_text(n)),
        nested => Cow::Owned(nested.to_string()),
    }
}

/// Numbers as a spreadsheet shows them: `10.0` reads as `10`
fn number_text(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if !n.is_i64() && !n.is_u64() && f.is_finite() && f.fract() == 0.0 => {
            format!("{:.0}", f)
        }
        _ => n.to_string(),
    }
}

/// Cut text down to what a cell can hold
fn fit_cell(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MAX_CELL_CHARS {
        return Cow::Borrowed(text);
    }
    warn!(
        "Truncating {} character cell to {}",
        text.chars().count(),
        MAX_CELL_CHARS
    );
    Cow::Owned(text.chars().take(MAX_CELL_CHARS).collect())
}

/// Worksheet column for a zero-based index
fn column_index(col: usize) -> Result<u16> {
    u16::try_from(col)
        .map_err(|_| Error::InvalidRecord(format!("too many columns: {}", col + 1)))
}

fn row_index(row: usize) -> Result<u32> {
    u32::try_from(row).map_err(|_| Error::InvalidRecord(format!("too many rows: {}", row)))
}

/// min(max(header, longest cell) + padding, cap), lengths in characters
pub fn column_width(column: &str, rows: &[Row], options: &ExportOptions) -> usize {
    let longest_cell = rows
        .iter()
        .map(|row| {
            row.get(column)
                .map(|v| cell_text(v).chars().count())
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0);

    let content = column.chars().count().max(longest_cell);
    (content + options.column_padding).min(options.max_column_width)
}

/// `<base>_<YYYY-MM-DD>.xlsx`
pub fn export_file_name(base_name: &str, date: NaiveDate) -> String {
    format!("{}_{}.xlsx", base_name, date.format("%Y-%m-%d"))
}

/// Render sheets into xlsx bytes, one worksheet each, in order
pub fn build_workbook(sheets: &[ExportSheet<'_>]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet.label)?;

        // Header row
        for (col, column) in sheet.columns.iter().enumerate() {
            worksheet.write_string(0, column_index(col)?, &*fit_cell(column))?;
        }

        for (i, row) in sheet.rows.iter().enumerate() {
            let excel_row = row_index(i + 1)?;
            for (col, column) in sheet.columns.iter().enumerate() {
                let col = column_index(col)?;
                match row.get(column) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(s)) => {
                        worksheet.write_string(excel_row, col, &*fit_cell(s))?;
                    }
                    Some(Value::Number(n)) => match n.as_f64() {
                        Some(number) => {
                            worksheet.write_number(excel_row, col, number)?;
                        }
                        None => {
                            worksheet.write_string(excel_row, col, &n.to_string())?;
                        }
                    },
                    Some(Value::Bool(b)) => {
                        worksheet.write_boolean(excel_row, col, *b)?;
                    }
                    Some(nested) => {
                        worksheet.write_string(excel_row, col, &*fit_cell(&nested.to_string()))?;
                    }
                }
            }
        }

        for (col, width) in sheet.widths.iter().enumerate() {
            worksheet.set_column_width(column_index(col)?, *width as f64)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Turns row collections into xlsx files and hands them to a sink
///
/// Empty input is never an error, it just doesn't produce a file. Workbook
/// and sink failures are passed straight back to the caller. Text longer
/// than [`MAX_CELL_CHARS`] is truncated to fit in its cell.
pub struct Exporter<D> {
    sink: D,
    options: ExportOptions,
}

impl<D: DownloadSink> Exporter<D> {
    pub fn new(sink: D) -> Self {
        Self::with_options(sink, ExportOptions::default())
    }

    pub fn with_options(sink: D, options: ExportOptions) -> Self {
        Self { sink, options }
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export one table as a single-sheet workbook
    pub fn export_single(
        &self,
        rows: &[Row],
        base_name: &str,
        sheet_label: &str,
    ) -> Result<ExportOutcome> {
        if rows.is_empty() {
            warn!("No data to export for {}", base_name);
            return Ok(ExportOutcome::Skipped);
        }

        let sheet = ExportSheet::new(sheet_label, rows, &self.options);
        self.deliver(base_name, &[sheet])
    }

    /// Export several tables as tabs of one workbook
    ///
    /// Empty tables are left out. If they're all empty, no file at all.
    pub fn export_multiple(&self, sheets: &[SheetData], base_name: &str) -> Result<ExportOutcome> {
        let prepared: Vec<ExportSheet<'_>> = sheets
            .iter()
            .filter_map(|sheet| {
                if sheet.rows.is_empty() {
                    warn!("Skipping empty sheet '{}' in {}", sheet.label, base_name);
                    None
                } else {
                    Some(ExportSheet::new(&sheet.label, &sheet.rows, &self.options))
                }
            })
            .collect();

        if prepared.is_empty() {
            warn!("No data to export for {}", base_name);
            return Ok(ExportOutcome::Skipped);
        }

        self.deliver(base_name, &prepared)
    }

    fn deliver(&self, base_name: &str, sheets: &[ExportSheet<'_>]) -> Result<ExportOutcome> {
        let bytes = build_workbook(sheets)?;
        let file_name = export_file_name(base_name, Utc::now().date_naive());

        self.sink.deliver(&file_name, &bytes)?;

        let labels: Vec<String> = sheets.iter().map(|s| s.label.to_string()).collect();
        info!(
            "Exported {} ({} sheet(s): {})",
            file_name,
            labels.len(),
            labels.join(", ")
        );

        Ok(ExportOutcome::Delivered {
            file_name,
            sheets: labels,
        })
    }
}
