//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific
//! modules.

mod analyze;
mod import;
mod prompt_cmd;
mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::aggregate::TrendGranularity;
use crate::config::Settings;
use crate::prompt::{default_prompt_version, DEFAULT_PROMPT_VERSION};
use crate::repository::Store;

#[derive(Parser)]
#[command(name = "narramine")]
#[command(about = "Narrative extraction and analytics pipeline")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory, database and default prompt version
    Init,

    /// Import narratives from an NDJSON feed
    Import {
        /// Feed file, one JSON narrative per line
        file: PathBuf,
    },

    /// Run the extraction pipeline over pending narratives
    Analyze {
        /// Limit number of narratives to process (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Show store status and pending work
    Status,

    /// Aggregation reports over accepted extractions
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Answer a templated natural-language question
    Ask {
        /// The question, e.g. "top 5 themes"
        question: String,
        /// Minimum confidence (default: configured threshold)
        #[arg(long)]
        min_confidence: Option<f64>,
    },

    /// List permanently failed extractions for triage
    Failures,

    /// Manage prompt versions
    Prompt {
        #[command(subcommand)]
        command: PromptCommands,
    },

    /// Export extraction records
    Export {
        /// Output format
        #[arg(long, value_enum, default_value = "ndjson")]
        format: ExportFormat,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Theme distribution with counts, sentiment and percentages
    Themes {
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Project type distribution
    Types {
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Theme pair co-occurrence counts
    Cooccurrence {
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Quality flag fractions and sentiment histogram
    Quality {
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Per-theme counts over time with period-over-period change
    Trend {
        #[arg(long, value_enum, default_value = "month")]
        granularity: TrendGranularity,
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Technology mention counts, optionally within a theme
    Technologies {
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        min_confidence: Option<f64>,
        #[arg(long, default_value = "25")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum PromptCommands {
    /// List registered prompt versions
    List,
    /// Make a version the active one
    Activate { version: String },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ExportFormat {
    Ndjson,
    Csv,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = Some(data_dir);
    }

    match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::Import { file } => import::cmd_import(&settings, &file),
        Commands::Analyze { limit } => analyze::cmd_analyze(&settings, limit).await,
        Commands::Status => report::cmd_status(&settings),
        Commands::Report { command } => {
            let store = open_store(&settings)?;
            match command {
                ReportCommands::Themes { min_confidence } => {
                    report::cmd_report_themes(&settings, &store, min_confidence)
                }
                ReportCommands::Types { min_confidence } => {
                    report::cmd_report_types(&settings, &store, min_confidence)
                }
                ReportCommands::Cooccurrence { min_confidence } => {
                    report::cmd_report_cooccurrence(&settings, &store, min_confidence)
                }
                ReportCommands::Quality { min_confidence } => {
                    report::cmd_report_quality(&settings, &store, min_confidence)
                }
                ReportCommands::Trend {
                    granularity,
                    min_confidence,
                } => report::cmd_report_trend(&settings, &store, granularity, min_confidence),
                ReportCommands::Technologies {
                    theme,
                    min_confidence,
                    limit,
                } => report::cmd_report_technologies(
                    &settings,
                    &store,
                    theme.as_deref(),
                    min_confidence,
                    limit,
                ),
            }
        }
        Commands::Ask {
            question,
            min_confidence,
        } => report::cmd_ask(&settings, &question, min_confidence),
        Commands::Failures => report::cmd_failures(&settings),
        Commands::Prompt { command } => match command {
            PromptCommands::List => prompt_cmd::cmd_prompt_list(&settings),
            PromptCommands::Activate { version } => {
                prompt_cmd::cmd_prompt_activate(&settings, &version)
            }
        },
        Commands::Export { format, output } => {
            report::cmd_export(&settings, format, output.as_deref())
        }
    }
}

/// Open the store at the configured path.
pub(crate) fn open_store(settings: &Settings) -> anyhow::Result<Store> {
    Ok(Store::new(&settings.database_path())?)
}

/// Initialize the data directory, database and default prompt version.
fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let data_dir = settings.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    std::fs::create_dir_all(settings.cache_dir())?;

    let store = open_store(settings)?;
    let mut seed = default_prompt_version();
    seed.active = store.active_prompt()?.is_none();
    store.insert_prompt_version(&seed)?;
    if store.active_prompt()?.is_none() {
        store.activate_prompt(DEFAULT_PROMPT_VERSION)?;
    }

    println!(
        "{} Initialized data directory at {}",
        console::style("✓").green(),
        data_dir.display()
    );
    println!(
        "  Database: {}",
        store.database_path().display()
    );
    println!(
        "  Active prompt version: {}",
        store
            .active_prompt()?
            .map(|p| p.version)
            .unwrap_or_default()
    );
    Ok(())
}
