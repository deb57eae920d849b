//! Common column layout across several source schemas.
//!
//! Only columns every source can fill survive. The first schema supplies
//! labels, widths and header row; positions are then packed left to right,
//! keeping `gap_width` columns for the grouping column so the rendered sheet
//! can merge them into one wide cell.

use std::{collections::BTreeSet, ops::Deref};

use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LedgerError, LedgerResult},
    schema::{MAX_COLUMN, SheetSchema},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupingPolicy {
    pub key: String,
    pub gap_width: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub title: String,
    pub grouping: Option<GroupingPolicy>,
    /// Columns forced optional after reconciliation, for sources that cannot
    /// always fill them even though their schema says otherwise.
    pub force_optional: Vec<String>,
}

/// A [`SheetSchema`] produced by [`reconcile`]: source hints stripped and
/// positions packed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSchema(SheetSchema);

impl Deref for ReconciledSchema {
    type Target = SheetSchema;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub fn reconcile(
    schemas: &[&SheetSchema],
    policy: &ReconcilePolicy,
) -> LedgerResult<ReconciledSchema> {
    let (first, rest) = schemas
        .split_first()
        .ok_or_else(|| LedgerError::conflict("no source schemas to reconcile"))?;

    let mut common: BTreeSet<&str> = first.keys();
    for schema in rest {
        let keys = schema.keys();
        common.retain(|key| keys.contains(key));
    }
    if common.is_empty() {
        return Err(LedgerError::conflict(format!(
            "sheets {} share no columns",
            schemas.iter().map(|s| format!("'{}'", s.title)).join(", ")
        )));
    }
    if let Some(grouping) = &policy.grouping {
        if !common.contains(grouping.key.as_str()) {
            return Err(LedgerError::conflict(format!(
                "grouping column '{}' is not shared by every source",
                grouping.key
            )));
        }
        if !(1..=MAX_COLUMN).contains(&grouping.gap_width) {
            return Err(LedgerError::conflict(format!(
                "grouping column '{}' needs a gap width between 1 and {MAX_COLUMN}, got {}",
                grouping.key, grouping.gap_width
            )));
        }
    }

    let mut columns = first
        .columns
        .iter()
        .filter(|column| common.contains(column.key.as_str()))
        .cloned()
        .sorted_by(|a, b| a.position.cmp(&b.position).then_with(|| a.key.cmp(&b.key)))
        .collect::<Vec<_>>();
    debug!(
        "Reconciled {} schema(s) down to column(s) {}",
        schemas.len(),
        columns.iter().map(|c| c.key.as_str()).join(", ")
    );

    let mut next = columns.iter().map(|c| c.position).min().unwrap_or(1);
    for column in &mut columns {
        column.strip_source_hints();
        column.position = next;
        let span = match &policy.grouping {
            Some(grouping) if grouping.key == column.key => grouping.gap_width,
            _ => 1,
        };
        let last = next
            .checked_add(span - 1)
            .filter(|last| *last <= MAX_COLUMN)
            .ok_or_else(|| {
                LedgerError::conflict(format!(
                    "column '{}' at position {next} spanning {span} column(s) runs past column {MAX_COLUMN}",
                    column.key
                ))
            })?;
        next = last + 1;
    }

    let title = if policy.title.trim().is_empty() {
        first.title.clone()
    } else {
        policy.title.clone()
    };
    let mut schema = SheetSchema::new(title, first.header_row, columns);

    for key in &policy.force_optional {
        match schema.column_mut(key) {
            Some(column) => column.optional = true,
            None => warn!("Cannot mark '{key}' optional: column was not reconciled"),
        }
    }

    schema.validate()?;
    Ok(ReconciledSchema(schema))
}
