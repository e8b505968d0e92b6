//! ls command - List objects
//!
//! Lists every object under a prefix, following continuation pages, and
//! applies the name, time and size filters on the client.

use anyhow::Context;
use bkt_core::{BlobMetadata, Query};
use clap::Args;
use jiff::Timestamp;
use serde::Serialize;

use super::{fail, open_store};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// List objects
#[derive(Args, Debug, Default)]
pub struct LsArgs {
    /// Name prefix to list under (empty lists the whole bucket)
    #[arg(default_value = "")]
    pub prefix: String,

    /// Keep names matching a glob pattern (e.g. "logs/*.gz")
    #[arg(long)]
    pub name: Option<String>,

    /// Keep objects updated at or after this time (RFC 3339)
    #[arg(long)]
    pub newer_than: Option<Timestamp>,

    /// Keep objects updated before this time (RFC 3339)
    #[arg(long)]
    pub older_than: Option<Timestamp>,

    /// Keep objects of at least this many bytes
    #[arg(long)]
    pub min_size: Option<u64>,

    /// Keep objects of at most this many bytes
    #[arg(long)]
    pub max_size: Option<u64>,

    /// Records requested per listing page
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Summarize output (show totals)
    #[arg(long)]
    pub summarize: bool,
}

/// Output structure for ls command (JSON format)
#[derive(Debug, Serialize)]
struct LsOutput {
    items: Vec<LsItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
}

#[derive(Debug, Serialize)]
struct LsItem {
    name: String,
    size_bytes: u64,
    size_human: String,
    updated: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

impl From<&BlobMetadata> for LsItem {
    fn from(record: &BlobMetadata) -> Self {
        Self {
            name: record.name.clone(),
            size_bytes: record.size,
            size_human: record.size_human(),
            updated: record.updated,
            hash: record.hash.clone().filter(|h| !h.is_empty()),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct Summary {
    total_objects: usize,
    total_size_bytes: u64,
    total_size_human: String,
}

impl Summary {
    fn of(records: &[BlobMetadata]) -> Self {
        let total_size_bytes = records.iter().map(|r| r.size).sum();
        Self {
            total_objects: records.len(),
            total_size_bytes,
            total_size_human: humansize::format_size(total_size_bytes, humansize::BINARY),
        }
    }
}

/// Execute the ls command
pub async fn execute(args: LsArgs, profile: Option<&str>, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match run(&args, profile, &formatter).await {
        Ok(()) => ExitCode::Success,
        Err(e) => fail(&formatter, e),
    }
}

async fn run(args: &LsArgs, profile: Option<&str>, formatter: &Formatter) -> anyhow::Result<()> {
    let query = build_query(args)?;
    let store = open_store(profile).await?;

    let records = store
        .list(&query)
        .await
        .with_context(|| format!("Failed to list '{}'", query.prefix))?;

    if formatter.is_json() {
        formatter.json(&LsOutput {
            items: records.iter().map(LsItem::from).collect(),
            summary: args.summarize.then(|| Summary::of(&records)),
        });
        return Ok(());
    }

    if records.is_empty() {
        formatter.warning(&format!("No objects found under '{}'", query.prefix));
    }

    for record in &records {
        let date = record.updated.strftime("%Y-%m-%d %H:%M:%S").to_string();
        formatter.println(&format!(
            "{} {:>10} {}",
            formatter.dim(&format!("[{date}]")),
            record.size_human(),
            record.name
        ));
    }

    if args.summarize {
        let summary = Summary::of(&records);
        formatter.println(&format!(
            "\nTotal: {} objects, {}",
            summary.total_objects, summary.total_size_human
        ));
    }
    Ok(())
}

/// Translate the command-line filters into a query
fn build_query(args: &LsArgs) -> anyhow::Result<Query> {
    let mut query = Query::new(args.prefix.as_str());

    if let Some(page_size) = args.page_size {
        query = query.with_page_size(page_size);
    }
    if let Some(pattern) = &args.name {
        query = query
            .name_pattern(pattern)
            .with_context(|| format!("Invalid --name pattern '{pattern}'"))?;
    }
    if let Some(ts) = args.newer_than {
        query = query.updated_after(ts);
    }
    if let Some(ts) = args.older_than {
        query = query.updated_before(ts);
    }
    if let Some(bytes) = args.min_size {
        query = query.min_size(bytes);
    }
    if let Some(bytes) = args.max_size {
        query = query.max_size(bytes);
    }

    Ok(query)
}
