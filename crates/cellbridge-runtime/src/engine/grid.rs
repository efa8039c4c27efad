//! In-memory multi-sheet grid used as the engine's cell source.
//!
//! JSON document form:
//!
//! ```json
//! {"sheets": {"Sheet1": {"cells": [
//!     {"row": 1, "col": 1, "value": {"type": "Number", "value": "42"}}
//! ]}}}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use cellbridge_common::{A1Range, SheetExtent, TypedCellValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::CellSource;
use crate::protocol::{CellGrid, GridCell};

pub const DEFAULT_SHEET: &str = "Sheet1";

#[derive(Debug, Error)]
pub enum GridLoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("grid parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sheet '{sheet}': cell at row {row}, col {col} is not 1-based")]
    ZeroCoordinate { sheet: String, row: u32, col: u32 },
    #[error("default sheet '{0}' is not defined")]
    UnknownDefaultSheet(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct GridDocument {
    #[serde(default)]
    default_sheet: Option<String>,
    sheets: BTreeMap<String, SheetDocument>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SheetDocument {
    #[serde(default)]
    cells: Vec<CellDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CellDocument {
    row: u32,
    col: u32,
    value: TypedCellValue,
}

#[derive(Debug, Clone, Default)]
struct SheetCells {
    /// Keyed by (row, col) so a row-major scan is a single range walk.
    cells: BTreeMap<(u32, u32), TypedCellValue>,
    extent: SheetExtent,
}

impl SheetCells {
    fn set(&mut self, col: u32, row: u32, value: TypedCellValue) {
        if value.is_blank() {
            self.cells.remove(&(row, col));
            return;
        }
        self.extent.max_col = self.extent.max_col.max(col);
        self.extent.max_row = self.extent.max_row.max(row);
        self.cells.insert((row, col), value);
    }
}

#[derive(Debug, Clone)]
pub struct MemoryGrid {
    sheets: BTreeMap<String, SheetCells>,
    default_sheet: String,
}

impl Default for MemoryGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGrid {
    /// A grid with one empty sheet named `Sheet1`.
    pub fn new() -> Self {
        let mut sheets = BTreeMap::new();
        sheets.insert(DEFAULT_SHEET.to_string(), SheetCells::default());
        Self {
            sheets,
            default_sheet: DEFAULT_SHEET.to_string(),
        }
    }

    pub fn default_sheet(&self) -> &str {
        &self.default_sheet
    }

    pub fn add_sheet(&mut self, name: impl Into<String>) {
        self.sheets.entry(name.into()).or_default();
    }

    /// Set a cell (1-based). Writing `Blank` clears it.
    pub fn set(&mut self, sheet: &str, col: u32, row: u32, value: TypedCellValue) {
        self.sheets
            .entry(sheet.to_string())
            .or_default()
            .set(col, row, value);
    }

    /// Set a cell on the default sheet.
    pub fn set_value(&mut self, col: u32, row: u32, value: TypedCellValue) {
        let sheet = self.default_sheet.clone();
        self.set(&sheet, col, row, value);
    }

    pub fn get(&self, sheet: &str, col: u32, row: u32) -> Option<&TypedCellValue> {
        self.sheets.get(sheet)?.cells.get(&(row, col))
    }

    pub fn extent(&self, sheet: &str) -> Option<SheetExtent> {
        self.sheets.get(sheet).map(|s| s.extent)
    }

    pub fn from_json_str(text: &str) -> Result<Self, GridLoadError> {
        let doc: GridDocument = serde_json::from_str(text)?;
        let mut sheets = BTreeMap::new();
        for (name, sheet_doc) in doc.sheets {
            let mut sheet = SheetCells::default();
            for cell in sheet_doc.cells {
                if cell.row == 0 || cell.col == 0 {
                    return Err(GridLoadError::ZeroCoordinate {
                        sheet: name,
                        row: cell.row,
                        col: cell.col,
                    });
                }
                sheet.set(cell.col, cell.row, cell.value);
            }
            sheets.insert(name, sheet);
        }

        let default_sheet = match doc.default_sheet {
            Some(name) if sheets.contains_key(&name) => name,
            Some(name) => return Err(GridLoadError::UnknownDefaultSheet(name)),
            None if sheets.contains_key(DEFAULT_SHEET) => DEFAULT_SHEET.to_string(),
            None => match sheets.keys().next().cloned() {
                Some(first) => first,
                None => {
                    sheets.insert(DEFAULT_SHEET.to_string(), SheetCells::default());
                    DEFAULT_SHEET.to_string()
                }
            },
        };
        Ok(Self {
            sheets,
            default_sheet,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GridLoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

impl CellSource for MemoryGrid {
    fn cells(&self, range: &str) -> Result<CellGrid, String> {
        let parsed = A1Range::parse(range).map_err(|e| format!("invalid range '{range}': {e}"))?;
        let sheet_name = parsed.sheet.as_deref().unwrap_or(&self.default_sheet);
        let sheet = self
            .sheets
            .get(sheet_name)
            .ok_or_else(|| format!("unknown sheet '{sheet_name}'"))?;
        let rect = parsed.resolve(sheet.extent);

        let mut cells = Vec::new();
        if !rect.is_empty() {
            let first = (rect.y, rect.x);
            let last = (rect.y + rect.h - 1, rect.x + rect.w - 1);
            for (&(row, col), value) in sheet.cells.range(first..=last) {
                if rect.contains(col, row) {
                    cells.push(GridCell {
                        x: col,
                        y: row,
                        value: value.clone(),
                    });
                }
            }
        }

        Ok(CellGrid {
            x: rect.x,
            y: rect.y,
            w: rect.w,
            h: rect.h,
            one_dimensional: parsed.is_column_range(),
            two_dimensional: parsed.is_two_dimensional(),
            cells,
        })
    }
}
