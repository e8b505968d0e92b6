//! stat command - Show object status and metadata
//!
//! Resolves the object through the store and reports the handle's stat
//! summary together with its metadata map.

use anyhow::Context;
use bkt_core::{Metadata, ObjectStat};
use clap::Args;
use serde::Serialize;

use super::{fail, open_store};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Show object status and metadata
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Object name
    pub name: String,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    #[serde(flatten)]
    stat: ObjectStat,
    mode_octal: String,
    size_human: String,
    metadata: Metadata,
}

impl StatOutput {
    fn new(stat: ObjectStat, metadata: Metadata) -> Self {
        Self {
            mode_octal: format!("{:04o}", stat.mode),
            size_human: humansize::format_size(stat.size, humansize::BINARY),
            stat,
            metadata,
        }
    }

    fn print(&self, formatter: &Formatter) {
        formatter.println(&format!("Name      : {}", self.stat.name));
        formatter.println(&format!(
            "Date      : {}",
            self.stat.updated.strftime("%Y-%m-%d %H:%M:%S UTC")
        ));
        formatter.println(&format!(
            "Size      : {} ({} bytes)",
            self.size_human, self.stat.size
        ));
        formatter.println(&format!("Mode      : {}", self.mode_octal));

        if !self.metadata.is_empty() {
            formatter.println("Metadata  :");
            let rows = self
                .metadata
                .iter()
                .map(|(k, v)| vec![k.to_string(), v.to_string()])
                .collect();
            formatter.table(&["KEY", "VALUE"], rows);
        }
    }
}

/// Execute the stat command
pub async fn execute(args: StatArgs, profile: Option<&str>, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match run(&args, profile).await {
        Ok(output) => {
            if formatter.is_json() {
                formatter.json(&output);
            } else {
                output.print(&formatter);
            }
            ExitCode::Success
        }
        Err(e) => fail(&formatter, e),
    }
}

async fn run(args: &StatArgs, profile: Option<&str>) -> anyhow::Result<StatOutput> {
    let mut store = open_store(profile).await?;
    let handle = store
        .get(&args.name)
        .await
        .with_context(|| format!("Failed to resolve '{}'", args.name))?;

    Ok(StatOutput::new(handle.stat(), handle.metadata().clone()))
}
