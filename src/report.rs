//! Section-by-section report assembly.
//!
//! For every configured section the orchestrator reconciles the schemas of
//! the participating sources, fetches and normalizes their records, merges
//! them by date, renders the sheet and registers shop highlighting. A failing
//! section is recorded in the [`ReportSummary`] and the next one proceeds; a
//! failing source only removes its own rows from the section.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::{
    aggregate::aggregate,
    backend::{Document, ReportBackend, validate_sheet_title},
    config::{Config, SectionConfig},
    error::{LedgerError, LedgerResult},
    normalize::normalize_lenient,
    progress::ProgressSink,
    reconcile::{ReconcilePolicy, ReconciledSchema, reconcile},
    render::{RenderOptions, RenderedSheet, render},
    schema::SheetSchema,
    source::{Source, SourceRegistry},
    style::{ShopColor, apply_shop_highlighting},
    thumbnail::ThumbnailResolver,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub sections: Vec<SectionConfig>,
    pub shops: Vec<ShopColor>,
    /// Global thumbnail switch; a section embeds images only when both this
    /// and its own flag are set.
    pub thumbnails: bool,
}

impl ReportConfig {
    pub fn from_config(config: &Config, thumbnails: bool) -> Self {
        Self {
            sections: config.sections.clone(),
            shops: config.shops.clone(),
            thumbnails,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionStatus {
    Rendered { rows: usize, fill_rules: usize },
    Failed(LedgerError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionOutcome {
    pub section: String,
    pub status: SectionStatus,
    pub source_failures: Vec<LedgerError>,
    pub dropped: Vec<LedgerError>,
}

impl SectionOutcome {
    fn new(section: &str) -> Self {
        Self {
            section: section.to_string(),
            status: SectionStatus::Failed(LedgerError::conflict("section was not built")),
            source_failures: Vec::new(),
            dropped: Vec::new(),
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self.status, SectionStatus::Rendered { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportSummary {
    pub sections: Vec<SectionOutcome>,
    /// Destination of the saved workbook; `None` when nothing was written.
    pub written: Option<PathBuf>,
}

impl ReportSummary {
    pub fn rendered_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_rendered()).count()
    }

    pub fn section(&self, name: &str) -> Option<&SectionOutcome> {
        self.sections.iter().find(|s| s.section == name)
    }

    pub fn source_failures(&self) -> impl Iterator<Item = &LedgerError> {
        self.sections.iter().flat_map(|s| s.source_failures.iter())
    }

    pub fn dropped_count(&self) -> usize {
        self.sections.iter().map(|s| s.dropped.len()).sum()
    }

    /// True when every section rendered with no skipped sources or records.
    pub fn is_clean(&self) -> bool {
        self.sections
            .iter()
            .all(|s| s.is_rendered() && s.source_failures.is_empty() && s.dropped.is_empty())
    }
}

pub struct ReportOrchestrator {
    config: ReportConfig,
}

impl ReportOrchestrator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Builds every section into a fresh document without persisting it.
    pub fn build(
        &self,
        registry: &SourceRegistry,
        progress: &mut dyn ProgressSink,
    ) -> (Document, ReportSummary) {
        let mut document = Document::new();
        let mut summary = ReportSummary::default();

        for section in &self.config.sections {
            let mut outcome = SectionOutcome::new(&section.name);
            match self.build_section(registry, section, &document, progress, &mut outcome) {
                Ok((sheet, fill_rules)) => {
                    info!(
                        "Section '{}' rendered with {} row(s)",
                        section.name, sheet.record_count
                    );
                    outcome.status = SectionStatus::Rendered {
                        rows: sheet.record_count,
                        fill_rules,
                    };
                    document.push(sheet);
                }
                Err(err) => {
                    error!("Section '{}' skipped: {err}", section.name);
                    outcome.status = SectionStatus::Failed(err);
                }
            }
            summary.sections.push(outcome);
        }

        if summary.rendered_count() > 0 {
            document.remove_default_sheet();
        }
        (document, summary)
    }

    /// Builds the report and hands it to `backend`. Only a backend failure is
    /// returned as an error; everything else is reported in the summary.
    pub fn run(
        &self,
        registry: &SourceRegistry,
        backend: &dyn ReportBackend,
        output: &Path,
        progress: &mut dyn ProgressSink,
    ) -> LedgerResult<ReportSummary> {
        info!("Start generating report {output:?}");
        let (document, mut summary) = self.build(registry, progress);
        if summary.rendered_count() == 0 {
            error!("No section could be rendered; leaving {output:?} untouched");
            return Ok(summary);
        }
        backend.persist(&document, output)?;
        summary.written = Some(output.to_path_buf());
        info!("Complete generating report {output:?}");
        Ok(summary)
    }

    pub fn section_schema(
        &self,
        registry: &SourceRegistry,
        section: &SectionConfig,
    ) -> LedgerResult<ReconciledSchema> {
        let sheets = section
            .sources
            .iter()
            .map(|name| section_sheet(registry, section, name).map(|(_, sheet)| sheet))
            .collect::<LedgerResult<Vec<_>>>()?;
        let policy = ReconcilePolicy {
            title: section.title.clone(),
            grouping: section.grouping.clone(),
            force_optional: section.force_optional.clone(),
        };
        reconcile(&sheets, &policy)
    }

    fn build_section(
        &self,
        registry: &SourceRegistry,
        section: &SectionConfig,
        document: &Document,
        progress: &mut dyn ProgressSink,
        outcome: &mut SectionOutcome,
    ) -> LedgerResult<(RenderedSheet, usize)> {
        let schema = self.section_schema(registry, section)?;
        validate_sheet_title(&schema.title)?;
        if document.sheet(&schema.title).is_some() {
            return Err(LedgerError::conflict(format!(
                "sheet title '{}' is already used by an earlier section",
                schema.title
            )));
        }

        let mut per_source = Vec::with_capacity(section.sources.len());
        for name in &section.sources {
            let (source, sheet) = section_sheet(registry, section, name)?;
            let mut aliases = source.aliases().clone();
            aliases.extend_from_schema(sheet);
            match source.fetch_records(&section.name) {
                Ok(raw) => {
                    let normalized = normalize_lenient(raw, source.shop_name(), &schema, &aliases);
                    outcome.dropped.extend(normalized.rejected);
                    per_source.push(normalized.records);
                }
                Err(err) => {
                    warn!(
                        "Fetching '{}' records from {} failed: {err:#}",
                        section.name,
                        source.name()
                    );
                    outcome.source_failures.push(LedgerError::SourceFetchFailure {
                        source_name: source.name().to_string(),
                        section: section.name.clone(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        let records = aggregate(per_source);
        schema.last_data_row(records.len())?;
        progress.set_total(&section.name, records.len());

        let resolver = ThumbnailResolver::new(registry);
        let options = RenderOptions {
            thumbnails: self.config.thumbnails && section.thumbnails,
            merge: section.grouping.clone(),
        };
        let mut sheet = render(
            &schema,
            &records,
            |record| resolver.resolve(record),
            &options,
            |_| progress.increment(&section.name),
        );
        let fill_rules =
            apply_shop_highlighting(&mut sheet, &schema, records.len(), &self.config.shops)?;
        Ok((sheet, fill_rules))
    }
}

fn section_sheet<'r>(
    registry: &'r SourceRegistry,
    section: &SectionConfig,
    name: &str,
) -> LedgerResult<(&'r dyn Source, &'r SheetSchema)> {
    let source = registry.by_name(name).ok_or_else(|| {
        LedgerError::conflict(format!(
            "section '{}' uses unregistered source '{name}'",
            section.name
        ))
    })?;
    let sheet = source.schema().select(&section.name).ok_or_else(|| {
        LedgerError::conflict(format!(
            "source '{name}' has no '{}' sheet",
            section.name
        ))
    })?;
    Ok((source, sheet))
}
