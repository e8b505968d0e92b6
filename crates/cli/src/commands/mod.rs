//! CLI command definitions and execution
//!
//! Every command works against the bucket of one profile. Commands build a
//! [`Store`] from the selected profile, drive object handles through it and
//! map failures to exit codes at the edge.

use std::sync::Arc;

use anyhow::Context;
use bkt_core::{ConfigManager, ProfileManager, ResolvedProfile, Store};
use bkt_s3::S3Client;
use clap::{Parser, Subcommand};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod cat;
mod completions;
mod ls;
mod profile;
mod put;
mod rm;
mod stat;
mod truncate;

/// bkt - buffered object handles over an S3 bucket
///
/// Reads and writes objects through in-memory handles that are uploaded
/// once when closed.
#[derive(Parser, Debug)]
#[command(name = "bkt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress spinner
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    /// Profile to use (required when more than one is configured)
    #[arg(short, long, global = true, env = "BKT_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage bucket profiles
    #[command(subcommand)]
    Profile(profile::ProfileCommands),

    /// List objects, optionally filtered
    Ls(ls::LsArgs),

    /// Write object contents to stdout
    Cat(cat::CatArgs),

    /// Write stdin into an object
    Put(put::PutArgs),

    /// Cut or extend an object to a size
    Truncate(truncate::TruncateArgs),

    /// Show object status and metadata
    Stat(stat::StatArgs),

    /// Remove objects
    Rm(rm::RmArgs),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    // Flags override the configured output defaults
    let defaults = ConfigManager::new()
        .and_then(|m| m.load())
        .map(|c| c.defaults)
        .unwrap_or_default();
    let output_config = OutputConfig {
        json: cli.json || defaults.output == "json",
        no_color: cli.no_color || defaults.color == "never",
        no_progress: cli.no_progress || !defaults.progress,
        quiet: cli.quiet,
    };
    let selected = cli.profile.as_deref();

    match cli.command {
        Commands::Profile(cmd) => profile::execute(cmd, output_config),
        Commands::Ls(args) => ls::execute(args, selected, output_config).await,
        Commands::Cat(args) => cat::execute(args, selected, output_config).await,
        Commands::Put(args) => put::execute(args, selected, output_config).await,
        Commands::Truncate(args) => truncate::execute(args, selected, output_config).await,
        Commands::Stat(args) => stat::execute(args, selected, output_config).await,
        Commands::Rm(args) => rm::execute(args, selected, output_config).await,
        Commands::Completions(args) => completions::execute(args),
    }
}

/// Build a store over the selected profile's bucket
async fn open_store(requested: Option<&str>) -> anyhow::Result<Store> {
    let ResolvedProfile { profile, page_size } = ProfileManager::new()
        .context("Failed to load configuration")?
        .resolve(requested)?;

    let client = S3Client::new(&profile)
        .await
        .with_context(|| format!("Failed to create S3 client for profile '{}'", profile.name))?;

    tracing::debug!(profile = %profile.name, bucket = %profile.bucket, "Opened store");

    Ok(Store::new(Arc::new(client), profile.bucket.clone())
        .with_page_size(page_size)
        .with_retry(&profile.retry_config()))
}

/// Report a command failure and pick its exit code
fn fail(formatter: &Formatter, err: anyhow::Error) -> ExitCode {
    formatter.error(&format!("{err:#}"));
    ExitCode::from_error(&err)
}
