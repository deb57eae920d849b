//! Report container and the Excel backend that persists it.
//!
//! [`Document`] mirrors a freshly created workbook: it starts with one empty
//! default sheet that the orchestrator removes once real sheets exist.
//! [`XlsxBackend`] replays each [`RenderedSheet`] write log through
//! `rust_xlsxwriter` and publishes the file atomically (temporary file in the
//! destination directory, then rename).

use std::{
    fmt::Display,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, info, warn};
use rust_xlsxwriter::{
    ColNum, Color, ConditionalFormatFormula, ExcelDateTime, Format, FormatAlign, FormatBorder,
    FormatPattern, Image, RowNum, Workbook, Worksheet, XlsxError,
};

use crate::{
    config::FontConfig,
    error::{LedgerError, LedgerResult},
    render::{CellStyle, CellValue, RenderedSheet, SheetOp},
    style::{FillRule, parse_rgb},
};

pub const DEFAULT_SHEET_TITLE: &str = "Sheet";
const THUMBNAIL_ROW_HEIGHT: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    sheets: Vec<RenderedSheet>,
    has_default_sheet: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            sheets: vec![RenderedSheet::new(DEFAULT_SHEET_TITLE, 1)],
            has_default_sheet: true,
        }
    }

    pub fn push(&mut self, sheet: RenderedSheet) {
        self.sheets.push(sheet);
    }

    pub fn sheets(&self) -> &[RenderedSheet] {
        &self.sheets
    }

    /// Rendered sheet with the given title. Excel treats titles
    /// case-insensitively, and so does the lookup.
    pub fn sheet(&self, title: &str) -> Option<&RenderedSheet> {
        let skip = usize::from(self.has_default_sheet());
        self.sheets
            .iter()
            .skip(skip)
            .find(|sheet| sheet.title.to_lowercase() == title.to_lowercase())
    }

    pub fn has_default_sheet(&self) -> bool {
        self.has_default_sheet
    }

    /// Drops the initial empty sheet. Returns whether there was one to drop.
    pub fn remove_default_sheet(&mut self) -> bool {
        if !self.has_default_sheet {
            return false;
        }
        self.sheets.remove(0);
        self.has_default_sheet = false;
        true
    }
}

/// Checks `title` against Excel's worksheet naming rules: 1 to 31
/// characters, none of `[ ] : * ? / \`, no leading or trailing apostrophe.
pub fn validate_sheet_title(title: &str) -> LedgerResult<()> {
    let mut scratch = Worksheet::new();
    scratch
        .set_name(title)
        .map(|_| ())
        .map_err(|err| LedgerError::conflict(format!("sheet title '{title}' is not usable: {err}")))
}

pub trait ReportBackend {
    fn persist(&self, document: &Document, path: &Path) -> LedgerResult<()>;
}

#[derive(Debug, Clone)]
pub struct XlsxBackend {
    font: FontConfig,
}

struct Formats {
    header: Format,
    body: Format,
    date: Format,
    datetime: Format,
}

impl XlsxBackend {
    pub fn new(font: FontConfig) -> Self {
        Self { font }
    }

    fn formats(&self) -> Formats {
        let body = Format::new()
            .set_font_name(self.font.name.as_str())
            .set_font_size(self.font.size);
        Formats {
            header: body
                .clone()
                .set_bold()
                .set_border(FormatBorder::Thin)
                .set_align(FormatAlign::Center),
            date: body.clone().set_num_format("yyyy/mm/dd"),
            datetime: body.clone().set_num_format("yyyy/mm/dd hh:mm"),
            body,
        }
    }

    pub fn build_workbook(&self, document: &Document) -> Result<Workbook, XlsxError> {
        let formats = self.formats();
        let mut workbook = Workbook::new();
        for sheet in document.sheets() {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(sheet.title.as_str())?;
            for op in sheet.ops() {
                apply_op(worksheet, op, &formats)?;
            }
            debug!(
                "Prepared worksheet '{}' ({} operation(s))",
                sheet.title,
                sheet.ops().len()
            );
        }
        Ok(workbook)
    }
}

impl ReportBackend for XlsxBackend {
    fn persist(&self, document: &Document, path: &Path) -> LedgerResult<()> {
        if document.sheets().is_empty() {
            return Err(write_failure(path, "the report has no sheets"));
        }
        let mut workbook = self
            .build_workbook(document)
            .map_err(|err| write_failure(path, err))?;
        let buffer = workbook
            .save_to_buffer()
            .map_err(|err| write_failure(path, err))?;
        publish(path, &buffer)?;
        info!("Excel file written to {path:?}");
        Ok(())
    }
}

fn write_failure(path: &Path, message: impl Display) -> LedgerError {
    LedgerError::BackendWriteFailure {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Writes `bytes` next to `path` and renames into place, so readers never see
/// a partial file.
pub fn publish(path: &Path, bytes: &[u8]) -> LedgerResult<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|err| write_failure(path, err))?;
    let mut staged =
        tempfile::NamedTempFile::new_in(&parent).map_err(|err| write_failure(path, err))?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|err| write_failure(path, err))?;
    staged
        .persist(path)
        .map_err(|err| write_failure(path, err.error))?;
    Ok(())
}

fn cell(row: u32, column: u32) -> Result<(RowNum, ColNum), XlsxError> {
    let col = ColNum::try_from(column.saturating_sub(1))
        .map_err(|_| XlsxError::RowColumnLimitError)?;
    Ok((row.saturating_sub(1), col))
}

fn apply_op(worksheet: &mut Worksheet, op: &SheetOp, formats: &Formats) -> Result<(), XlsxError> {
    match op {
        SheetOp::ColumnWidth { column, width } => {
            let (_, col) = cell(1, *column)?;
            worksheet.set_column_width(col, *width)?;
        }
        SheetOp::Cell {
            row,
            column,
            value,
            style,
        } => {
            let (r, c) = cell(*row, *column)?;
            write_cell(worksheet, r, c, value, *style, formats)?;
        }
        SheetOp::Merge {
            row,
            first_column,
            last_column,
            value,
            style,
        } => {
            let (r, first) = cell(*row, *first_column)?;
            let (_, last) = cell(*row, *last_column)?;
            let format = match style {
                CellStyle::Header => &formats.header,
                CellStyle::Body => &formats.body,
            };
            worksheet.merge_range(r, first, r, last, "", format)?;
            write_cell(worksheet, r, first, value, *style, formats)?;
        }
        SheetOp::Image { row, column, path } => {
            let (r, c) = cell(*row, *column)?;
            match Image::new(path) {
                Ok(image) => {
                    worksheet.set_row_height(r, THUMBNAIL_ROW_HEIGHT)?;
                    worksheet.insert_image_fit_to_cell(r, c, &image, true)?;
                }
                Err(err) => warn!("Skipping unreadable thumbnail {path:?}: {err}"),
            }
        }
        SheetOp::FillRule(rule) => add_fill_rule(worksheet, rule)?,
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    value: &CellValue,
    style: CellStyle,
    formats: &Formats,
) -> Result<(), XlsxError> {
    let base = match style {
        CellStyle::Header => &formats.header,
        CellStyle::Body => &formats.body,
    };
    match value {
        CellValue::Blank => {
            worksheet.write_blank(row, col, base)?;
        }
        CellValue::Text(text) => {
            worksheet.write_string_with_format(row, col, text, base)?;
        }
        CellValue::Number(number) => {
            worksheet.write_number_with_format(row, col, *number, base)?;
        }
        CellValue::Date(date) => {
            let datetime = excel_date(date)?;
            worksheet.write_datetime_with_format(row, col, &datetime, &formats.date)?;
        }
        CellValue::DateTime(datetime) => {
            let converted = excel_datetime(datetime)?;
            worksheet.write_datetime_with_format(row, col, &converted, &formats.datetime)?;
        }
    }
    Ok(())
}

fn excel_date(date: &NaiveDate) -> Result<ExcelDateTime, XlsxError> {
    let year = u16::try_from(date.year()).map_err(|_| XlsxError::DateTimeRangeError(date.to_string()))?;
    ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)
}

fn excel_datetime(datetime: &NaiveDateTime) -> Result<ExcelDateTime, XlsxError> {
    excel_date(&datetime.date())?.and_hms(
        datetime.hour() as u16,
        datetime.minute() as u8,
        datetime.second(),
    )
}

fn add_fill_rule(worksheet: &mut Worksheet, rule: &FillRule) -> Result<(), XlsxError> {
    let rgb = parse_rgb(&rule.color).ok_or_else(|| {
        XlsxError::ParameterError(format!("invalid fill color '{}'", rule.color))
    })?;
    let fill = Format::new()
        .set_background_color(Color::RGB(rgb))
        .set_pattern(FormatPattern::Solid);
    let conditional = ConditionalFormatFormula::new()
        .set_rule(rule.formula.as_str())
        .set_format(fill);
    let (first_row, col) = cell(rule.first_row, rule.column)?;
    let (last_row, _) = cell(rule.last_row, rule.column)?;
    worksheet.add_conditional_format(first_row, col, last_row, col, &conditional)?;
    Ok(())
}
