//! Tabular file I/O.
//!
//! The pipeline works on a plain string table: one header row plus cell rows.
//! CSV goes through the `csv` crate; .xls/.xlsx are read with `calamine` and
//! written with `rust_xlsxwriter` (legacy .xls input is written back as .xlsx,
//! since nothing writes the legacy format anymore).

use std::path::Path;

use calamine::{DataType, Reader, open_workbook_auto};
use rust_xlsxwriter::Workbook;

use crate::error::PipelineError;

/// Supported input formats, keyed off the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    Excel,
}

impl SheetFormat {
    /// Classify a path by extension, case-insensitive.
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xls" | "xlsx" => Ok(Self::Excel),
            other => Err(PipelineError::UnsupportedFormat(if other.is_empty() {
                "<none>".to_string()
            } else {
                format!(".{}", other)
            })),
        }
    }

    /// Extension used for the processed output file.
    pub fn output_extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "xlsx",
        }
    }
}

/// In-memory table: header row plus string cells. Rows are padded to the
/// header width on load, so column indexing is always in bounds.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of `name`, appending a new blank column if it is missing.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value.into();
        }
    }

    fn pad_rows(&mut self) {
        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }
}

/// Load a table from disk, dispatching on the extension.
pub fn read_table(path: &Path) -> Result<Table, PipelineError> {
    match SheetFormat::from_path(path)? {
        SheetFormat::Csv => read_csv(path),
        SheetFormat::Excel => read_excel(path),
    }
}

/// Write a table to disk in the given format.
pub fn write_table(table: &Table, path: &Path, format: SheetFormat) -> Result<(), PipelineError> {
    match format {
        SheetFormat::Csv => write_csv(table, path),
        SheetFormat::Excel => write_xlsx(table, path),
    }
}

fn read_csv(path: &Path) -> Result<Table, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| PipelineError::Sheet(e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Sheet(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = Table {
        headers,
        rows: Vec::new(),
    };
    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::Sheet(e.to_string()))?;
        table.rows.push(record.iter().map(|c| c.to_string()).collect());
    }
    table.pad_rows();
    Ok(table)
}

fn read_excel(path: &Path) -> Result<Table, PipelineError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| PipelineError::Sheet(e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_owned();
    let first = sheet_names
        .first()
        .ok_or_else(|| PipelineError::Sheet("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(first)
        .ok_or_else(|| PipelineError::Sheet(format!("sheet {} not readable", first)))?
        .map_err(|e| PipelineError::Sheet(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(cell_to_string).collect())
        .unwrap_or_default();

    let mut table = Table {
        headers,
        rows: rows
            .map(|cells| cells.iter().map(cell_to_string).collect())
            .collect(),
    };
    table.pad_rows();
    Ok(table)
}

/// Stringify a cell; whole floats lose the trailing `.0` so an app_id typed
/// as a number in Excel still parses as an integer.
fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.to_string(),
        DataType::Float(f) if f.fract() == 0.0 => format!("{:.0}", f),
        DataType::Float(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::Empty => String::new(),
        other => other.to_string(),
    }
}

fn write_csv(table: &Table, path: &Path) -> Result<(), PipelineError> {
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| PipelineError::Sheet(e.to_string()))?;
    writer
        .write_record(&table.headers)
        .map_err(|e| PipelineError::Sheet(e.to_string()))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| PipelineError::Sheet(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| PipelineError::Sheet(e.to_string()))?;
    Ok(())
}

fn write_xlsx(table: &Table, path: &Path) -> Result<(), PipelineError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, header)
            .map_err(|e| PipelineError::Sheet(e.to_string()))?;
    }
    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32 + 1, col as u16, value)
                .map_err(|e| PipelineError::Sheet(e.to_string()))?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| PipelineError::Sheet(e.to_string()))?;
    Ok(())
}
