pub mod aggregate;
pub mod backend;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod normalize;
pub mod progress;
pub mod reconcile;
pub mod render;
pub mod report;
pub mod schema;
pub mod source;
pub mod style;
pub mod table;
pub mod thumbnail;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    backend::XlsxBackend,
    cli::{Cli, Commands},
    config::Config,
    progress::LogProgress,
    report::{ReportConfig, ReportOrchestrator, ReportSummary, SectionStatus},
    source::SourceRegistry,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("shop_ledger", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Generate(args) => handle_generate(&args),
        Commands::Schema(args) => handle_schema(&args),
        Commands::Fetch(args) => handle_fetch(&args),
    }
}

fn load_config(path: &std::path::Path) -> Result<(Config, SourceRegistry)> {
    let config = Config::load(path).with_context(|| format!("Loading config from {path:?}"))?;
    let registry = SourceRegistry::from_config(&config.sources)
        .with_context(|| format!("Opening sources listed in {path:?}"))?;
    debug!("Registered {} source(s)", registry.len());
    Ok((config, registry))
}

fn handle_generate(args: &cli::GenerateArgs) -> Result<()> {
    let (config, registry) = load_config(&args.config)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| config.output_path().to_path_buf());
    let orchestrator =
        ReportOrchestrator::new(ReportConfig::from_config(&config, !args.no_thumbnails));
    let backend = XlsxBackend::new(config.output.excel.font.clone());
    let mut progress = LogProgress::new();

    let result = orchestrator.run(&registry, &backend, &output, &mut progress);
    registry.finish_all();
    let summary = result.with_context(|| format!("Generating report {output:?}"))?;

    print_summary(&config, &summary);
    if summary.written.is_none() {
        bail!("No section could be rendered; {output:?} was not written");
    }
    if summary.is_clean() {
        info!("Report {output:?} written with every section complete");
    } else {
        warn!(
            "Report {:?} written: {} of {} section(s), {} skipped source(s), {} dropped record(s)",
            output,
            summary.rendered_count(),
            summary.sections.len(),
            summary.source_failures().count(),
            summary.dropped_count()
        );
    }
    Ok(())
}

fn print_summary(config: &Config, summary: &ReportSummary) {
    let rows = config
        .sections
        .iter()
        .filter_map(|section| summary.section(&section.name).map(|outcome| (section, outcome)))
        .map(|(section, outcome)| {
            let (status, rows) = match &outcome.status {
                SectionStatus::Rendered { rows, .. } => ("rendered".to_string(), rows.to_string()),
                SectionStatus::Failed(err) => (format!("failed: {err}"), String::new()),
            };
            vec![
                outcome.section.clone(),
                section.title.clone(),
                rows,
                outcome.source_failures.len().to_string(),
                outcome.dropped.len().to_string(),
                status,
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(
        &["section", "sheet", "rows", "failed sources", "dropped", "status"],
        &rows,
    );
    for failure in summary.source_failures() {
        warn!("{failure}");
    }
}

fn handle_schema(args: &cli::SchemaArgs) -> Result<()> {
    let (config, registry) = load_config(&args.config)?;
    let section = config
        .section(&args.section)
        .ok_or_else(|| anyhow!("Section '{}' is not configured", args.section))?;
    let orchestrator = ReportOrchestrator::new(ReportConfig::from_config(&config, false));
    let schema = orchestrator
        .section_schema(&registry, section)
        .with_context(|| format!("Reconciling section '{}'", section.name))?;

    let rows = schema
        .columns_by_position()
        .into_iter()
        .map(|column| {
            vec![
                column.position.to_string(),
                column.key.clone(),
                column.label.clone(),
                if column.optional { "yes" } else { "" }.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&["pos", "key", "label", "optional"], &rows);
    info!(
        "Sheet '{}' has {} column(s) under header row {}",
        schema.title,
        schema.columns.len(),
        schema.header_row
    );
    Ok(())
}

fn handle_fetch(args: &cli::FetchArgs) -> Result<()> {
    let (config, registry) = load_config(&args.config)?;
    let mut rows = Vec::new();
    let mut failed = Vec::new();

    for source in registry.iter() {
        info!("Start fetching records from {}", source.name());
        let sections = config
            .sections
            .iter()
            .filter(|section| section.sources.iter().any(|name| name == source.name()));
        for section in sections {
            let status = match source.fetch_records(&section.name) {
                Ok(records) => records.len().to_string(),
                Err(err) => {
                    warn!(
                        "Fetching '{}' records from {} failed: {err:#}",
                        section.name,
                        source.name()
                    );
                    failed.push(source.name().to_string());
                    "failed".to_string()
                }
            };
            rows.push(vec![source.name().to_string(), section.name.clone(), status]);
        }
        if let Err(err) = source.finish() {
            warn!("Closing source {} failed: {err:#}", source.name());
        }
        info!("Finished fetching records from {}", source.name());
    }

    table::print_table(&["source", "section", "records"], &rows);
    if !failed.is_empty() {
        failed.dedup();
        bail!("Fetching failed for {}", failed.join(", "));
    }
    Ok(())
}
