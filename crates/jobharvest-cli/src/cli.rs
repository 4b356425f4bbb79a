//! Command-line interface for the harvester.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use jobharvest_browser::IdentityRotator;
use jobharvest_core::{HarvestingConfiguration, Region};
use jobharvest_pipeline::{
    BackoffState, DatePosted, ExperienceLevel, FetchLayer, HarvestOrchestrator, HarvestReport,
    JobType, SearchFilters, SearchQuery, SelectorSet, Terminal, WorkType,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Jobharvest - Paced harvest of public job listings into scored records.
#[derive(Debug, Parser)]
#[command(name = "jobharvest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/jobharvest/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Harvest result pages for a search and print the report as JSON.
    Harvest(HarvestArgs),

    /// Write the default configuration to the config path.
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct HarvestArgs {
    /// Search keywords (e.g., "rust engineer")
    pub keywords: String,

    /// Location filter (e.g., "Berlin")
    #[arg(short, long, default_value = "")]
    pub location: String,

    /// Number of result pages to harvest
    #[arg(short, long, default_value_t = 5)]
    pub pages: u32,

    /// Region code (US, UK, DE, ...); overrides the config file
    #[arg(short, long)]
    pub region: Option<Region>,

    /// Seniority (internship, entry_level, associate, mid_senior, director, executive)
    #[arg(long, value_parser = snake_case::<ExperienceLevel>)]
    pub experience: Option<ExperienceLevel>,

    /// Contract type (full_time, part_time, contract, temporary, volunteer, internship, other)
    #[arg(long, value_parser = snake_case::<JobType>)]
    pub job_type: Option<JobType>,

    /// Posting age (any, past_day, past_week, past_month)
    #[arg(long, value_parser = snake_case::<DatePosted>)]
    pub date_posted: Option<DatePosted>,

    /// Workplace (on_site, remote, hybrid)
    #[arg(long, value_parser = snake_case::<WorkType>)]
    pub work_type: Option<WorkType>,

    /// Salary band code
    #[arg(long)]
    pub salary_min: Option<String>,

    /// Company id
    #[arg(long)]
    pub company: Option<String>,

    /// Industry id
    #[arg(long)]
    pub industry: Option<String>,

    /// Company size code
    #[arg(long)]
    pub company_size: Option<String>,

    /// JSON selector set replacing the built-in one
    #[arg(long)]
    pub selectors: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep duplicate listings in the output
    #[arg(long)]
    pub keep_duplicates: bool,
}

impl HarvestArgs {
    fn query(&self) -> SearchQuery {
        SearchQuery {
            keywords: self.keywords.clone(),
            location: self.location.clone(),
            filters: SearchFilters {
                experience_level: self.experience,
                job_type: self.job_type,
                date_posted: self.date_posted.unwrap_or_default(),
                work_type: self.work_type,
                salary_min: self.salary_min.clone(),
                company: self.company.clone(),
                industry: self.industry.clone(),
                company_size: self.company_size.clone(),
            },
        }
    }
}

/// Parse a snake_case filter value through its serde representation.
fn snake_case<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_lowercase()))
        .map_err(|_| format!("unrecognised value `{value}`"))
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest(args) => harvest_command(cli.config.as_deref(), &args).await,
        Commands::InitConfig { force } => init_config_command(cli.config.as_deref(), force),
    }
}

fn load_config(path: Option<&Path>, args: &HarvestArgs) -> anyhow::Result<HarvestingConfiguration> {
    let mut config =
        HarvestingConfiguration::load_with_env(path).context("failed to load configuration")?;
    if let Some(region) = args.region {
        config.region = region;
    }
    if args.keep_duplicates {
        config.orchestration.remove_duplicates = false;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_selectors(path: &Path) -> anyhow::Result<SelectorSet> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read selectors from {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse selectors in {}", path.display()))
}

/// Execute the harvest command.
async fn harvest_command(config_path: Option<&Path>, args: &HarvestArgs) -> anyhow::Result<()> {
    let config = load_config(config_path, args)?;

    let rotator = Arc::new(IdentityRotator::from_config(&config.identity)?);
    let backoff = Arc::new(BackoffState::new());
    let fetcher = FetchLayer::from_config(&config, Arc::clone(&rotator), Arc::clone(&backoff))?;

    let mut orchestrator = HarvestOrchestrator::new(config, Arc::new(fetcher))?
        .with_rotator(rotator)
        .with_backoff_state(backoff);
    if let Some(path) = &args.selectors {
        orchestrator = orchestrator.with_selectors(load_selectors(path)?)?;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with the records harvested so far");
            on_signal.cancel();
        }
    });

    let report = orchestrator.run(&args.query(), args.pages, cancel).await?;
    log_outcome(&report);
    write_report(&report, args.output.as_deref())
}

fn log_outcome(report: &HarvestReport) {
    let summary = &report.summary;
    match report.terminal {
        Terminal::Completed => info!(
            records = summary.total_records,
            duplicates = summary.duplicates_removed,
            average_score = summary.average_quality_score,
            "Harvest completed"
        ),
        Terminal::Aborted(reason) => warn!(
            ?reason,
            records = summary.total_records,
            "Harvest aborted"
        ),
        Terminal::Cancelled => warn!(records = summary.total_records, "Harvest cancelled"),
    }
}

fn write_report(report: &HarvestReport, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Execute the init-config command.
fn init_config_command(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => HarvestingConfiguration::config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    HarvestingConfiguration::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
