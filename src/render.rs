//! Lays a merged record list out on a sheet.
//!
//! Rendering does not touch a workbook. It produces a [`RenderedSheet`]: the
//! sheet title plus an ordered write log of [`SheetOp`]s that a backend
//! replays. Keeping the log in memory makes the layout deterministic and
//! testable without reading spreadsheet files back.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};

use crate::{
    data::{Record, Value},
    reconcile::GroupingPolicy,
    schema::{ColumnSpec, MAX_COLUMN, SheetSchema},
    style::FillRule,
    thumbnail::Thumbnail,
};

/// Column key whose cell receives the record's thumbnail.
pub const THUMBNAIL_KEY: &str = "image";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }
}

impl From<&Value> for CellValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => CellValue::Text(s.clone()),
            Value::Integer(i) => CellValue::Number(*i as f64),
            Value::Float(f) => CellValue::Number(*f),
            Value::Boolean(_) => CellValue::Text(value.as_display()),
            Value::Date(d) => CellValue::Date(*d),
            Value::DateTime(dt) => CellValue::DateTime(*dt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStyle {
    Header,
    Body,
}

/// One backend instruction. Rows and columns are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetOp {
    ColumnWidth {
        column: u32,
        width: f64,
    },
    Cell {
        row: u32,
        column: u32,
        value: CellValue,
        style: CellStyle,
    },
    Merge {
        row: u32,
        first_column: u32,
        last_column: u32,
        value: CellValue,
        style: CellStyle,
    },
    Image {
        row: u32,
        column: u32,
        path: PathBuf,
    },
    FillRule(FillRule),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSheet {
    pub title: String,
    pub header_row: u32,
    pub record_count: usize,
    ops: Vec<SheetOp>,
}

impl RenderedSheet {
    pub fn new(title: impl Into<String>, header_row: u32) -> Self {
        Self {
            title: title.into(),
            header_row,
            record_count: 0,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[SheetOp] {
        &self.ops
    }

    pub fn push(&mut self, op: SheetOp) {
        self.ops.push(op);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub thumbnails: bool,
    /// Grouping column whose cells span the reserved gap.
    pub merge: Option<GroupingPolicy>,
}

impl RenderOptions {
    fn span(&self, column: &ColumnSpec) -> u32 {
        match &self.merge {
            Some(grouping) if grouping.key == column.key => grouping.gap_width.max(1),
            _ => 1,
        }
    }
}

pub fn render<T, P>(
    schema: &SheetSchema,
    records: &[Record],
    thumbnails: T,
    options: &RenderOptions,
    mut progress: P,
) -> RenderedSheet
where
    T: Fn(&Record) -> Thumbnail,
    P: FnMut(usize),
{
    let columns = schema.columns_by_position();
    let mut sheet = RenderedSheet::new(schema.title.clone(), schema.header_row);

    for column in &columns {
        if let Some(width) = column.width {
            sheet.push(SheetOp::ColumnWidth {
                column: column.position,
                width,
            });
        }
    }

    for column in &columns {
        let value = CellValue::Text(column.label.clone());
        write_value(&mut sheet, schema.header_row, column, options, value, CellStyle::Header);
    }

    let thumbnail_column = thumbnail_column(schema, &columns, options);
    let with_images = options.thumbnails && thumbnail_column <= MAX_COLUMN;
    if options.thumbnails && !with_images {
        warn!(
            "Sheet '{}' has no room for thumbnails after its last column; skipping them",
            schema.title
        );
    }
    for (idx, record) in records.iter().enumerate() {
        let row = schema.header_row + 1 + idx as u32;
        for column in &columns {
            // The thumbnail occupies its own cell.
            let value = if options.thumbnails && column.key == THUMBNAIL_KEY {
                CellValue::Blank
            } else {
                record
                    .get(&column.key)
                    .map(CellValue::from)
                    .unwrap_or(CellValue::Blank)
            };
            if value.is_blank() && !column.optional && column.key != THUMBNAIL_KEY {
                debug!(
                    "Row {row}: required column '{}' is empty for {}",
                    column.key,
                    record.shop_name()
                );
            }
            write_value(&mut sheet, row, column, options, value, CellStyle::Body);
        }
        if with_images
            && let Thumbnail::Path(path) = thumbnails(record)
        {
            sheet.push(SheetOp::Image {
                row,
                column: thumbnail_column,
                path,
            });
        }
        sheet.record_count += 1;
        progress(sheet.record_count);
    }

    debug!(
        "Rendered sheet '{}' with {} row(s)",
        sheet.title, sheet.record_count
    );
    sheet
}

fn write_value(
    sheet: &mut RenderedSheet,
    row: u32,
    column: &ColumnSpec,
    options: &RenderOptions,
    value: CellValue,
    style: CellStyle,
) {
    let span = options.span(column);
    if span > 1 {
        sheet.push(SheetOp::Merge {
            row,
            first_column: column.position,
            last_column: column.position.saturating_add(span - 1),
            value,
            style,
        });
    } else {
        sheet.push(SheetOp::Cell {
            row,
            column: column.position,
            value,
            style,
        });
    }
}

fn thumbnail_column(schema: &SheetSchema, columns: &[&ColumnSpec], options: &RenderOptions) -> u32 {
    if let Some(column) = schema.column(THUMBNAIL_KEY) {
        return column.position;
    }
    columns
        .iter()
        .map(|column| column.position.saturating_add(options.span(column)))
        .max()
        .unwrap_or(1)
}
