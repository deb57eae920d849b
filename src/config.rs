//! YAML run configuration.
//!
//! ```yaml
//! output:
//!   excel:
//!     table: out/ledger.xlsx
//!     font: { name: Meiryo, size: 10 }
//! shops:
//!   - { name: Amazon, color: FF9900 }
//! sources:
//!   - name: amazon
//!     shop_name: Amazon
//!     schema: schema/amazon.yaml
//!     records: { bought: data/amazon.json }
//!     thumbnails: thumb/amazon
//!     aliases: { id: [asin] }
//! sections:
//!   - name: bought
//!     title: Bought
//!     sources: [amazon]
//!     grouping: { key: category, gap_width: 3 }
//!     force_optional: [price]
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    backend::validate_sheet_title, normalize::AliasTable, reconcile::GroupingPolicy,
    style::ShopColor,
};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    #[serde(default)]
    pub shops: Vec<ShopColor>,
    pub sources: Vec<SourceConfig>,
    pub sections: Vec<SectionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub excel: ExcelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcelConfig {
    pub table: PathBuf,
    #[serde(default)]
    pub font: FontConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FontConfig {
    pub name: String,
    pub size: f64,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            name: "Calibri".to_string(),
            size: 11.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub shop_name: Option<String>,
    pub schema: PathBuf,
    #[serde(default)]
    pub records: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub thumbnails: Option<PathBuf>,
    #[serde(default = "SourceConfig::default_thumbnail_key")]
    pub thumbnail_key: String,
    #[serde(default)]
    pub aliases: AliasTable,
}

impl SourceConfig {
    fn default_thumbnail_key() -> String {
        "id".to_string()
    }

    pub fn shop_name(&self) -> &str {
        self.shop_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionConfig {
    pub name: String,
    pub title: String,
    pub sources: Vec<String>,
    #[serde(default = "SectionConfig::default_thumbnails")]
    pub thumbnails: bool,
    #[serde(default)]
    pub grouping: Option<GroupingPolicy>,
    #[serde(default)]
    pub force_optional: Vec<String>,
}

impl SectionConfig {
    fn default_thumbnails() -> bool {
        true
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.resolve_paths(&base);
        config
            .validate()
            .with_context(|| format!("Validating config file {path:?}"))?;
        Ok(config)
    }

    pub fn output_path(&self) -> &Path {
        &self.output.excel.table
    }

    pub fn section(&self, name: &str) -> Option<&SectionConfig> {
        self.sections.iter().find(|section| section.name == name)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.output.excel.table);
        for source in &mut self.sources {
            resolve(&mut source.schema);
            source.records.values_mut().for_each(resolve);
            if let Some(dir) = source.thumbnails.as_mut() {
                resolve(dir);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.sections.is_empty(),
            "At least one report section must be configured"
        );
        ensure!(
            self.output.excel.font.size > 0.0,
            "Font size must be positive, got {}",
            self.output.excel.font.size
        );

        let mut names = BTreeSet::new();
        let mut shops = BTreeSet::new();
        for source in &self.sources {
            ensure!(
                names.insert(source.name.as_str()),
                "Source '{}' is configured twice",
                source.name
            );
            ensure!(
                shops.insert(source.shop_name()),
                "Shop name '{}' is used by more than one source",
                source.shop_name()
            );
        }

        let mut section_names = BTreeSet::new();
        let mut titles = BTreeSet::new();
        for section in &self.sections {
            ensure!(
                section_names.insert(section.name.as_str()),
                "Section '{}' is configured twice",
                section.name
            );
            ensure!(
                !section.title.trim().is_empty(),
                "Section '{}' needs a sheet title",
                section.name
            );
            validate_sheet_title(&section.title)
                .with_context(|| format!("Section '{}'", section.name))?;
            ensure!(
                titles.insert(section.title.to_lowercase()),
                "Sheet title '{}' of section '{}' is already used by another section",
                section.title,
                section.name
            );
            ensure!(
                !section.sources.is_empty(),
                "Section '{}' lists no sources",
                section.name
            );
            for source in &section.sources {
                if !names.contains(source.as_str()) {
                    bail!(
                        "Section '{}' refers to unknown source '{source}'",
                        section.name
                    );
                }
            }
        }

        for shop in &self.shops {
            shop.validate()?;
        }
        Ok(())
    }
}
