// Tabular extraction module
// Reads the multi-sheet sales spreadsheet into in-memory relational tables


use calamine::{Data, Reader, open_workbook_auto};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{RagError, Result};

/// A single scalar cell from a spreadsheet table.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    /// Numeric view of the cell, if it holds a number.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Date view of the cell. Textual cells are parsed as `YYYY-MM-DD`.
    #[inline]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Text(s) => {
                let prefix = s.trim().get(..10).unwrap_or(s.trim());
                NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => {
                if v.fract() == 0.0 {
                    write!(f, "{:.0}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A named relational table loaded from one spreadsheet sheet. Immutable
/// after extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Index of a column by name.
    #[inline]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// All tables from one spreadsheet, keyed by sheet name (preserved verbatim).
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub tables: BTreeMap<String, Table>,
}

impl Workbook {
    /// Read every sheet of the spreadsheet at `path` into a named table.
    /// The first row of each sheet is treated as the header row.
    #[inline]
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::DatasetNotFound(path.to_path_buf()));
        }

        info!("Loading dataset from {}", path.display());

        let mut workbook = open_workbook_auto(path).map_err(|e| {
            RagError::DatasetFormat(format!(
                "Failed to open spreadsheet {}: {}",
                path.display(),
                e
            ))
        })?;

        let sheet_names = workbook.sheet_names().to_vec();
        let mut tables = BTreeMap::new();

        for sheet_name in sheet_names {
            let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
                RagError::DatasetFormat(format!("Failed to read sheet '{}': {}", sheet_name, e))
            })?;

            let mut rows_iter = range.rows();
            let Some(header_row) = rows_iter.next() else {
                warn!("Sheet '{}' is empty, skipping", sheet_name);
                continue;
            };

            let columns: Vec<String> = header_row.iter().map(cell_to_string).collect();
            let rows: Vec<Vec<CellValue>> = rows_iter
                .map(|row| {
                    let mut cells: Vec<CellValue> = row.iter().map(convert_cell).collect();
                    // Calamine trims trailing empty cells per row
                    cells.resize(columns.len(), CellValue::Empty);
                    cells
                })
                .collect();

            debug!(
                "Loaded sheet '{}' with {} columns and {} rows",
                sheet_name,
                columns.len(),
                rows.len()
            );

            tables.insert(
                sheet_name.clone(),
                Table {
                    name: sheet_name,
                    columns,
                    rows,
                },
            );
        }

        if tables.is_empty() {
            return Err(RagError::DatasetFormat(format!(
                "Spreadsheet {} contains no usable sheets",
                path.display()
            )));
        }

        Ok(Self { tables })
    }

    #[inline]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| CellValue::Date(naive.date()))
            .unwrap_or_else(|| CellValue::Text(dt.to_string())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#ERR:{:?}", e)),
    }
}

fn cell_to_string(cell: &Data) -> String {
    convert_cell(cell).to_string()
}

/// Resolve the dataset path. An explicitly configured path must exist; it
/// never falls back to the scan, so a stray spreadsheet elsewhere cannot get
/// indexed in its place. Without one, scan `search_root` recursively for the
/// first spreadsheet file.
#[inline]
pub fn resolve_dataset_path(configured: Option<&Path>, search_root: &Path) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(RagError::DatasetNotFound(path.to_path_buf()));
    }

    if let Some(found) = find_spreadsheet(search_root) {
        info!("Using discovered dataset: {}", found.display());
        return Ok(found);
    }

    Err(RagError::DatasetNotFound(search_root.to_path_buf()))
}

fn find_spreadsheet(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xls"))
        {
            return Some(path);
        }
    }

    subdirs.sort();
    subdirs.iter().find_map(|sub| find_spreadsheet(sub))
}
