//! Per-shop row highlighting.
//!
//! Each configured shop gets one formula-driven conditional fill over the
//! data range of the `shop_name` column. Rules are registered in the
//! configured shop order so repeated runs produce the same workbook.

use log::debug;
use rust_xlsxwriter::utility::column_number_to_name;
use serde::{Deserialize, Serialize};

use crate::{
    data::SHOP_NAME_KEY,
    error::{LedgerError, LedgerResult},
    render::{RenderedSheet, SheetOp},
    schema::{MAX_COLUMN, SheetSchema},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShopColor {
    pub name: String,
    /// Six hex digits, `RRGGBB`.
    pub color: String,
}

impl ShopColor {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }

    pub fn rgb(&self) -> LedgerResult<u32> {
        parse_rgb(&self.color).ok_or_else(|| {
            LedgerError::conflict(format!(
                "color '{}' for shop '{}' is not an RRGGBB hex code",
                self.color, self.name
            ))
        })
    }

    pub fn validate(&self) -> LedgerResult<()> {
        self.rgb().map(|_| ())
    }
}

pub fn parse_rgb(color: &str) -> Option<u32> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// A conditional fill over one column. Rows and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillRule {
    pub first_row: u32,
    pub last_row: u32,
    pub column: u32,
    pub shop_name: String,
    pub color: String,
    pub formula: String,
}

/// Spreadsheet reference such as `$C3`, column absolute and row relative.
pub fn column_anchored_ref(row: u32, column: u32) -> String {
    let name = column_number_to_name((column - 1) as u16);
    format!("${name}{row}")
}

pub fn apply_shop_highlighting(
    sheet: &mut RenderedSheet,
    schema: &SheetSchema,
    row_count: usize,
    colors: &[ShopColor],
) -> LedgerResult<usize> {
    let column = schema
        .column(SHOP_NAME_KEY)
        .ok_or_else(|| {
            LedgerError::conflict(format!(
                "sheet '{}' has no '{SHOP_NAME_KEY}' column to highlight",
                schema.title
            ))
        })?
        .position;
    if column == 0 || column > MAX_COLUMN {
        return Err(LedgerError::conflict(format!(
            "'{SHOP_NAME_KEY}' column position {column} is outside the sheet"
        )));
    }
    if row_count == 0 {
        debug!("Sheet '{}' has no rows to highlight", schema.title);
        return Ok(0);
    }

    let last_row = schema.last_data_row(row_count)?;
    let first_row = schema.header_row + 1;
    let anchor = column_anchored_ref(first_row, column);
    for shop in colors {
        shop.validate()?;
        let rule = FillRule {
            first_row,
            last_row,
            column,
            shop_name: shop.name.clone(),
            color: shop.color.trim().trim_start_matches('#').to_ascii_uppercase(),
            formula: format!("{anchor}=\"{}\"", shop.name.replace('"', "\"\"")),
        };
        sheet.push(SheetOp::FillRule(rule));
    }
    debug!(
        "Registered {} shop fill rule(s) on '{}' rows {first_row}..={last_row}",
        colors.len(),
        schema.title
    );
    Ok(colors.len())
}
