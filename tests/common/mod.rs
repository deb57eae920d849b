#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use shop_ledger::backend::{Document, ReportBackend};
use shop_ledger::data::{RawRecord, Record, Value};
use shop_ledger::error::{LedgerError, LedgerResult};
use shop_ledger::normalize::AliasTable;
use shop_ledger::progress::ProgressSink;
use shop_ledger::render::{CellValue, RenderedSheet, SheetOp};
use shop_ledger::schema::{ColumnSpec, SheetSchema, SourceSchema};
use shop_ledger::source::Source;
use shop_ledger::style::FillRule;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` under the workspace, creating parent directories.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_ref())
            .expect("write temp file contents");
        path
    }
}

/// A valid 1x1 transparent PNG.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn raw(fields: &[(&str, Value)]) -> RawRecord {
    fields
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub fn record(shop: &str, fields: &[(&str, Value)]) -> Record {
    Record::new(shop, raw(fields))
}

/// The four-column ledger layout used across the integration tests:
/// date, shop_name, item, price (optional), header on row 2.
pub fn ledger_schema(title: &str) -> SheetSchema {
    SheetSchema::new(
        title,
        2,
        vec![
            ColumnSpec::new("date", 1, "Date"),
            ColumnSpec::new("shop_name", 2, "Shop"),
            ColumnSpec::new("item", 3, "Item"),
            ColumnSpec::new("price", 4, "Price").optional(),
        ],
    )
}

/// In-memory source with canned records per section.
pub struct FakeSource {
    pub name: String,
    pub shop_name: String,
    pub schema: SourceSchema,
    pub aliases: AliasTable,
    pub records: BTreeMap<String, Vec<RawRecord>>,
    pub failing_sections: Vec<String>,
    pub thumbnails: BTreeMap<String, PathBuf>,
}

impl FakeSource {
    pub fn new(name: &str, schema: SheetSchema) -> Self {
        Self {
            name: name.to_string(),
            shop_name: name.to_string(),
            schema: SourceSchema::Flat { sheet: schema },
            aliases: AliasTable::new(),
            records: BTreeMap::new(),
            failing_sections: Vec::new(),
            thumbnails: BTreeMap::new(),
        }
    }

    pub fn sectioned(name: &str, sections: Vec<(&str, SheetSchema)>) -> Self {
        let mut source = Self::new(name, ledger_schema("unused"));
        source.schema = SourceSchema::Sectioned {
            sections: sections
                .into_iter()
                .map(|(section, sheet)| (section.to_string(), sheet))
                .collect(),
        };
        source
    }

    pub fn with_records(mut self, section: &str, records: Vec<RawRecord>) -> Self {
        self.records.insert(section.to_string(), records);
        self
    }

    pub fn failing(mut self, section: &str) -> Self {
        self.failing_sections.push(section.to_string());
        self
    }

    pub fn with_alias(mut self, key: &str, raw: &str) -> Self {
        self.aliases.insert(key, raw);
        self
    }

    pub fn with_thumbnail(mut self, item: &str, path: PathBuf) -> Self {
        self.thumbnails.insert(item.to_string(), path);
        self
    }
}

impl Source for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn shop_name(&self) -> &str {
        &self.shop_name
    }

    fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    fn fetch_records(&self, section: &str) -> Result<Vec<RawRecord>> {
        if self.failing_sections.iter().any(|s| s == section) {
            return Err(anyhow!("connection reset by {}", self.name));
        }
        Ok(self.records.get(section).cloned().unwrap_or_default())
    }

    fn thumbnail_path(&self, record: &Record) -> Result<Option<PathBuf>> {
        let item = record.get("item").map(Value::as_display).unwrap_or_default();
        if item == "broken" {
            return Err(anyhow!("thumbnail store unavailable"));
        }
        Ok(self.thumbnails.get(&item).cloned())
    }
}

/// Keeps the last persisted document in memory.
#[derive(Default)]
pub struct MemoryBackend {
    pub saved: RefCell<Vec<(PathBuf, Document)>>,
}

impl ReportBackend for MemoryBackend {
    fn persist(&self, document: &Document, path: &Path) -> LedgerResult<()> {
        self.saved
            .borrow_mut()
            .push((path.to_path_buf(), document.clone()));
        Ok(())
    }
}

pub struct FailingBackend;

impl ReportBackend for FailingBackend {
    fn persist(&self, _document: &Document, path: &Path) -> LedgerResult<()> {
        Err(LedgerError::BackendWriteFailure {
            path: path.to_path_buf(),
            message: "disk full".to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Total(String, usize),
    Tick(String),
}

#[derive(Default)]
pub struct RecordingProgress {
    pub events: Vec<ProgressEvent>,
}

impl ProgressSink for RecordingProgress {
    fn set_total(&mut self, section: &str, count: usize) {
        self.events
            .push(ProgressEvent::Total(section.to_string(), count));
    }

    fn increment(&mut self, section: &str) {
        self.events.push(ProgressEvent::Tick(section.to_string()));
    }
}

/// Read-side helpers over a rendered sheet's write log.
pub trait SheetExt {
    /// Value written at a 1-based cell; merged ranges answer at their first column.
    fn cell(&self, row: u32, column: u32) -> Option<&CellValue>;
    fn images(&self) -> impl Iterator<Item = (u32, u32, &PathBuf)>;
    fn fill_rules(&self) -> impl Iterator<Item = &FillRule>;
    /// Cell and merge writes, skipping widths, images and fills.
    fn content_ops(&self) -> impl Iterator<Item = &SheetOp>;
}

impl SheetExt for RenderedSheet {
    fn cell(&self, row: u32, column: u32) -> Option<&CellValue> {
        self.ops().iter().rev().find_map(|op| match op {
            SheetOp::Cell {
                row: r,
                column: c,
                value,
                ..
            } if *r == row && *c == column => Some(value),
            SheetOp::Merge {
                row: r,
                first_column,
                value,
                ..
            } if *r == row && *first_column == column => Some(value),
            _ => None,
        })
    }

    fn images(&self) -> impl Iterator<Item = (u32, u32, &PathBuf)> {
        self.ops().iter().filter_map(|op| match op {
            SheetOp::Image { row, column, path } => Some((*row, *column, path)),
            _ => None,
        })
    }

    fn fill_rules(&self) -> impl Iterator<Item = &FillRule> {
        self.ops().iter().filter_map(|op| match op {
            SheetOp::FillRule(rule) => Some(rule),
            _ => None,
        })
    }

    fn content_ops(&self) -> impl Iterator<Item = &SheetOp> {
        self.ops()
            .iter()
            .filter(|op| matches!(op, SheetOp::Cell { .. } | SheetOp::Merge { .. }))
    }
}
