//! Command Line Interface
//!
//! `clap` front end that runs export jobs described in a YAML file.

pub mod jobs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::facade;
use crate::infrastructure::driven_adapters::config::ConfigManager;
use crate::infrastructure::driven_adapters::database::DatabaseOptions;
use crate::infrastructure::driven_adapters::portal::PortalOptions;
use crate::shared::errors::{DataPortalError, Result};

pub use jobs::{load_job_file, ExportJob, JobFile};

#[derive(Debug, Parser)]
#[command(
    name = "psrc-data-portal",
    version,
    about = "Export PSRC SQL Server tables and layers to ArcGIS Online / Portal"
)]
pub struct Cli {
    /// Custom YAML configuration merged over the built-in defaults
    #[arg(long, short, env = "PSRC_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level, overriding the configuration file
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Export every resource listed in a job file
    Export {
        /// YAML file with a `jobs` list of `params` and `source` entries
        #[arg(long, short)]
        job: PathBuf,

        /// Always publish new items instead of updating existing ones
        #[arg(long)]
        create_new: bool,
    },
    /// Check that the required PSRC_* environment variables are set
    ValidateEnv,
    /// Print the effective configuration
    CheckConfig,
}

/// Run the parsed command
///
/// # Errors
///
/// Returns the first configuration or connection error, or a
/// `DataPortalError::DataExport` when any job failed.
pub async fn run(cli: Cli) -> Result<()> {
    let config = ConfigManager::load(cli.config.as_deref())?;
    facade::setup_logging(&config, cli.log_level.as_deref());
    if let Some(path) = &cli.config {
        tracing::info!(path = %path.display(), "Loaded custom configuration");
    }

    match cli.command {
        Command::ValidateEnv => {
            config.validate_required_env_vars()?;
            println!("All required environment variables are set");
            Ok(())
        }
        Command::CheckConfig => {
            println!("{:#?}", config.settings());
            if !facade::validate_environment(&config) {
                println!("Warning: required environment variables are missing");
            }
            Ok(())
        }
        Command::Export { job, create_new } => {
            let update_existing = !create_new && config.settings().export.update_existing;
            run_export(&config, &load_job_file(&job)?, update_existing).await
        }
    }
}

async fn run_export(config: &ConfigManager, jobs: &JobFile, update_existing: bool) -> Result<()> {
    let database = Arc::new(facade::create_database_connector(config, DatabaseOptions::default()).await?);
    let portal = Arc::new(facade::create_portal_connector(config, PortalOptions::default()).await?);

    let mut failed = Vec::new();
    for (index, job) in jobs.jobs.iter().enumerate() {
        let outcome = match facade::create_portal_resource(
            config,
            portal.clone(),
            database.clone(),
            &job.params,
            &job.source,
        ) {
            Ok(resource) => resource.export(update_existing).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(item) => println!("Exported job {} as item {}", index + 1, item.id),
            Err(e) => {
                tracing::error!(job = index + 1, error = %e, "Export job failed");
                failed.push(index + 1);
            }
        }
    }

    database.close().await;
    portal.close().await;

    if failed.is_empty() {
        return Ok(());
    }
    let numbers: Vec<String> = failed.iter().map(ToString::to_string).collect();
    Err(DataPortalError::data_export(format!(
        "{} of {} export jobs failed",
        failed.len(),
        jobs.jobs.len()
    ))
    .with_details(format!("Failed jobs: {}", numbers.join(", "))))
}
