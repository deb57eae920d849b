//! Record sources and the per-run source registry.
//!
//! Crawling retailers is out of scope for this crate. A [`Source`] is the
//! narrow seam a crawler plugs into; [`FileSource`] reads what a crawler left
//! on disk (JSON or CSV exports plus a thumbnail directory).

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};

use crate::{
    config::SourceConfig,
    data::{RawRecord, Record, Value, infer_value},
    normalize::AliasTable,
    schema::SourceSchema,
};

const THUMBNAIL_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

pub trait Source {
    /// Identifier used in configuration and log messages.
    fn name(&self) -> &str;

    /// Provenance tag stamped on every record of this source.
    fn shop_name(&self) -> &str;

    fn schema(&self) -> &SourceSchema;

    fn aliases(&self) -> &AliasTable;

    fn fetch_records(&self, section: &str) -> Result<Vec<RawRecord>>;

    fn thumbnail_path(&self, _record: &Record) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// One handle per source, built once per run and shared by fetching and
/// thumbnail lookup. Registration order is the cross-source merge order.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[SourceConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let source = FileSource::open(config)
                .with_context(|| format!("Opening source '{}'", config.name))?;
            registry.register(Box::new(source))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, source: Box<dyn Source>) -> Result<()> {
        if self.by_name(source.name()).is_some() {
            bail!("Source '{}' is registered twice", source.name());
        }
        if self.by_shop(source.shop_name()).is_some() {
            bail!("Shop name '{}' is registered twice", source.shop_name());
        }
        self.sources.push(source);
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn Source> {
        self.sources
            .iter()
            .find(|source| source.name() == name)
            .map(Box::as_ref)
    }

    pub fn by_shop(&self, shop_name: &str) -> Option<&dyn Source> {
        self.sources
            .iter()
            .find(|source| source.shop_name() == shop_name)
            .map(Box::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Source> {
        self.sources.iter().map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Releases every source; failures are logged and do not stop the others.
    pub fn finish_all(&self) -> usize {
        let mut failures = 0;
        for source in &self.sources {
            if let Err(err) = source.finish() {
                warn!("Closing source '{}' failed: {err:#}", source.name());
                failures += 1;
            }
        }
        failures
    }
}

pub struct FileSource {
    name: String,
    shop_name: String,
    schema: SourceSchema,
    aliases: AliasTable,
    records: BTreeMap<String, PathBuf>,
    thumbnails: Option<PathBuf>,
    thumbnail_key: String,
}

impl FileSource {
    pub fn open(config: &SourceConfig) -> Result<Self> {
        let schema = SourceSchema::load(&config.schema)?;
        debug!(
            "Opened source '{}' ({} sheet(s))",
            config.name,
            schema.sheets().len()
        );
        Ok(Self {
            name: config.name.clone(),
            shop_name: config.shop_name().to_string(),
            schema,
            aliases: config.aliases.clone(),
            records: config.records.clone(),
            thumbnails: config.thumbnails.clone(),
            thumbnail_key: config.thumbnail_key.clone(),
        })
    }
}

impl Source for FileSource {
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
        let path = self
            .records
            .get(section)
            .ok_or_else(|| anyhow!("no '{section}' records configured"))?;
        let records = read_records(path)?;
        info!(
            "Loaded {} '{section}' record(s) for {} from {:?}",
            records.len(),
            self.name,
            path
        );
        Ok(records)
    }

    fn thumbnail_path(&self, record: &Record) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.thumbnails else {
            return Ok(None);
        };
        let Some(stem) = record.get(&self.thumbnail_key).map(Value::as_display) else {
            return Ok(None);
        };
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.contains("..") {
            bail!("'{stem}' cannot be used as a thumbnail file name");
        }
        Ok(THUMBNAIL_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{stem}.{ext}")))
            .find(|candidate| candidate.is_file()))
    }
}

/// Reads a `.json` array of objects or a headed `.csv` export.
pub fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => read_json_records(path),
        Some(ext) if ext.eq_ignore_ascii_case("csv") => read_csv_records(path),
        _ => bail!("Unsupported record file {path:?}; expected .json or .csv"),
    }
}

fn read_json_records(path: &Path) -> Result<Vec<RawRecord>> {
    let file = File::open(path).with_context(|| format!("Opening record file {path:?}"))?;
    let rows: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing record file {path:?}"))?;
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut record = RawRecord::new();
            for (field, value) in row {
                let converted = Value::from_json(&value)
                    .with_context(|| format!("Record #{} field '{field}' in {path:?}", idx + 1))?;
                if let Some(value) = converted {
                    record.insert(field, value);
                }
            }
            Ok(record)
        })
        .collect()
}

fn read_csv_records(path: &Path) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)
        .with_context(|| format!("Opening record file {path:?}"))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Reading headers of {path:?}"))?
        .clone();
    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        let record = headers
            .iter()
            .zip(row.iter())
            .filter_map(|(field, raw)| infer_value(raw).map(|value| (field.to_string(), value)))
            .collect::<RawRecord>();
        records.push(record);
    }
    Ok(records)
}
