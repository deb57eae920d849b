//! Maps raw per-source records onto a target sheet schema.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    data::{RawRecord, Record, SHOP_NAME_KEY},
    error::{LedgerError, LedgerResult},
    schema::SheetSchema,
};

/// Per-source field aliases: target column key → raw field names, tried in
/// order when the raw record has no field named after the key itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AliasTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, raw: impl Into<String>) -> Self {
        self.insert(key, raw);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, raw: impl Into<String>) {
        let candidates = self.entries.entry(key.into()).or_default();
        let raw = raw.into();
        if !candidates.contains(&raw) {
            candidates.push(raw);
        }
    }

    /// Adds the `formal_key` of every column in `schema` as a fallback alias.
    pub fn extend_from_schema(&mut self, schema: &SheetSchema) {
        for column in &schema.columns {
            if let Some(raw) = &column.formal_key
                && raw != &column.key
            {
                self.insert(column.key.clone(), raw.clone());
            }
        }
    }

    pub fn candidates(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<Record>,
    pub rejected: Vec<LedgerError>,
}

pub fn normalize_record(
    mut raw: RawRecord,
    source_name: &str,
    schema: &SheetSchema,
    aliases: &AliasTable,
) -> LedgerResult<Record> {
    for column in &schema.columns {
        if column.key == SHOP_NAME_KEY || raw.contains_key(&column.key) {
            continue;
        }
        let aliased = aliases
            .candidates(&column.key)
            .iter()
            .find_map(|candidate| raw.get(candidate).cloned());
        match aliased {
            Some(value) => {
                raw.insert(column.key.clone(), value);
            }
            None if column.optional => {}
            None => {
                return Err(LedgerError::MissingRequiredField {
                    key: column.key.clone(),
                    source_name: source_name.to_string(),
                });
            }
        }
    }
    Ok(Record::new(source_name, raw))
}

/// Fails on the first record that cannot satisfy a required column.
pub fn normalize(
    raw_records: Vec<RawRecord>,
    source_name: &str,
    schema: &SheetSchema,
    aliases: &AliasTable,
) -> LedgerResult<Vec<Record>> {
    raw_records
        .into_iter()
        .map(|raw| normalize_record(raw, source_name, schema, aliases))
        .collect()
}

/// Drops records that cannot satisfy a required column and keeps the reasons.
pub fn normalize_lenient(
    raw_records: Vec<RawRecord>,
    source_name: &str,
    schema: &SheetSchema,
    aliases: &AliasTable,
) -> Normalized {
    let mut normalized = Normalized::default();
    for (idx, raw) in raw_records.into_iter().enumerate() {
        match normalize_record(raw, source_name, schema, aliases) {
            Ok(record) => normalized.records.push(record),
            Err(err) => {
                warn!("Dropping record #{} from {source_name}: {err}", idx + 1);
                normalized.rejected.push(err);
            }
        }
    }
    debug!(
        "Normalized {} record(s) from {source_name}, dropped {}",
        normalized.records.len(),
        normalized.rejected.len()
    );
    normalized
}
