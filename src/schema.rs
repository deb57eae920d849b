//! Sheet layout model shared by every source and by the rendered report.
//!
//! A [`SheetSchema`] places each semantic column (`date`, `price`,
//! `shop_name`, ...) at a 1-based spreadsheet column under a header row. A
//! source publishes its layout as a [`SourceSchema`], which is either a single
//! flat sheet or one sheet per report section.
//!
//! ## YAML shape
//!
//! ```yaml
//! kind: sectioned
//! sections:
//!   bought:
//!     title: Bought
//!     header_row: 2
//!     columns:
//!       - { key: date, position: 2, label: Date }
//!       - { key: price, position: 7, label: Price, optional: true }
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Last addressable worksheet column, `XFD`.
pub const MAX_COLUMN: u32 = 16_384;
/// Last addressable worksheet row.
pub const MAX_ROW: u32 = 1_048_576;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub key: String,
    #[serde(alias = "pos")]
    pub position: u32,
    #[serde(alias = "header_label")]
    pub label: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// Raw field name in the owning source when it differs from `key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formal_key: Option<String>,
    /// Source-specific transform hint; meaningless once records are normalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

impl ColumnSpec {
    pub fn new(key: impl Into<String>, position: u32, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            position,
            label: label.into(),
            optional: false,
            formal_key: None,
            value: None,
            width: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_formal_key(mut self, raw: impl Into<String>) -> Self {
        self.formal_key = Some(raw.into());
        self
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn strip_source_hints(&mut self) {
        self.formal_key = None;
        self.value = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SheetSchema {
    pub title: String,
    #[serde(default = "SheetSchema::default_header_row", alias = "header_row_position")]
    pub header_row: u32,
    pub columns: Vec<ColumnSpec>,
}

impl SheetSchema {
    fn default_header_row() -> u32 {
        1
    }

    pub fn new(title: impl Into<String>, header_row: u32, columns: Vec<ColumnSpec>) -> Self {
        Self {
            title: title.into(),
            header_row,
            columns,
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.title.trim().is_empty() {
            return Err(LedgerError::conflict("sheet title must not be empty"));
        }
        if !(1..=MAX_ROW).contains(&self.header_row) {
            return Err(LedgerError::conflict(format!(
                "sheet '{}' header row {} is outside 1..={MAX_ROW}",
                self.title, self.header_row
            )));
        }
        let mut keys = BTreeSet::new();
        let mut positions = BTreeSet::new();
        for column in &self.columns {
            if !(1..=MAX_COLUMN).contains(&column.position) {
                return Err(LedgerError::conflict(format!(
                    "column '{}' in sheet '{}' has position {} outside 1..={MAX_COLUMN}",
                    column.key, self.title, column.position
                )));
            }
            if !keys.insert(column.key.as_str()) {
                return Err(LedgerError::conflict(format!(
                    "column key '{}' appears twice in sheet '{}'",
                    column.key, self.title
                )));
            }
            if !positions.insert(column.position) {
                return Err(LedgerError::conflict(format!(
                    "position {} is used by more than one column in sheet '{}'",
                    column.position, self.title
                )));
            }
        }
        Ok(())
    }

    pub fn column(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.key == key)
    }

    pub fn column_mut(&mut self, key: &str) -> Option<&mut ColumnSpec> {
        self.columns.iter_mut().find(|column| column.key == key)
    }

    pub fn keys(&self) -> BTreeSet<&str> {
        self.columns.iter().map(|column| column.key.as_str()).collect()
    }

    /// Columns in left-to-right order; equal positions fall back to key order.
    pub fn columns_by_position(&self) -> Vec<&ColumnSpec> {
        self.columns
            .iter()
            .sorted_by(|a, b| a.position.cmp(&b.position).then_with(|| a.key.cmp(&b.key)))
            .collect()
    }

    /// Row holding the last of `row_count` records written below the header.
    pub fn last_data_row(&self, row_count: usize) -> LedgerResult<u32> {
        u32::try_from(row_count)
            .ok()
            .and_then(|count| self.header_row.checked_add(count))
            .filter(|row| *row <= MAX_ROW)
            .ok_or_else(|| {
                LedgerError::conflict(format!(
                    "{row_count} row(s) below header row {} do not fit in sheet '{}'",
                    self.header_row, self.title
                ))
            })
    }

    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|column| !column.optional)
            .map(|column| column.key.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSchema {
    Flat { sheet: SheetSchema },
    Sectioned { sections: BTreeMap<String, SheetSchema> },
}

impl SourceSchema {
    /// The sheet a source contributes to `section`. Flat sources answer for
    /// every section; participation is decided by configuration.
    pub fn select(&self, section: &str) -> Option<&SheetSchema> {
        match self {
            SourceSchema::Flat { sheet } => Some(sheet),
            SourceSchema::Sectioned { sections } => sections.get(section),
        }
    }

    pub fn sheets(&self) -> Vec<&SheetSchema> {
        match self {
            SourceSchema::Flat { sheet } => vec![sheet],
            SourceSchema::Sectioned { sections } => sections.values().collect(),
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        self.sheets().into_iter().try_for_each(SheetSchema::validate)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let schema: SourceSchema = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing schema file {path:?}"))?;
        schema
            .validate()
            .with_context(|| format!("Validating schema file {path:?}"))?;
        Ok(schema)
    }
}
