use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(author, version, about = "Merge shop purchase histories into one Excel ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate the Excel ledger from every configured section
    Generate(GenerateArgs),
    /// Show the reconciled column layout of one section
    Schema(SchemaArgs),
    /// Fetch every source once and report how many records it yields
    Fetch(FetchArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Leave thumbnail images out of every sheet
    #[arg(short = 'N', long = "no-thumbnails")]
    pub no_thumbnails: bool,
    /// Output workbook (overrides output.excel.table)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Section whose layout to print
    #[arg(short = 's', long = "section")]
    pub section: String,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Configuration file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}
