//! truncate command - Resize an object
//!
//! Cuts the object to the given size, or zero-fills it up to that size, and
//! uploads the result once.

use anyhow::Context;
use bkt_core::AccessLevel;
use clap::Args;
use serde::Serialize;

use super::{fail, open_store};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Cut or extend an object to a size
#[derive(Args, Debug)]
pub struct TruncateArgs {
    /// Object name
    pub name: String,

    /// New size in bytes
    pub size: u64,
}

#[derive(Debug, Serialize)]
struct TruncateOutput {
    name: String,
    previous_size_bytes: u64,
    size_bytes: u64,
}

/// Execute the truncate command
pub async fn execute(
    args: TruncateArgs,
    profile: Option<&str>,
    output_config: OutputConfig,
) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match run(&args, profile).await {
        Ok(output) => {
            if formatter.is_json() {
                formatter.json(&output);
            } else {
                formatter.success(&format!(
                    "Truncated '{}' from {} to {} bytes.",
                    output.name, output.previous_size_bytes, output.size_bytes
                ));
            }
            ExitCode::Success
        }
        Err(e) => fail(&formatter, e),
    }
}

async fn run(args: &TruncateArgs, profile: Option<&str>) -> anyhow::Result<TruncateOutput> {
    let mut store = open_store(profile).await?;
    let handle = store
        .get(&args.name)
        .await
        .with_context(|| format!("Failed to resolve '{}'", args.name))?;

    handle
        .open(AccessLevel::ReadWrite)
        .await
        .with_context(|| format!("Failed to open '{}'", args.name))?;
    let previous_size_bytes = handle.size();

    handle.truncate(args.size)?;
    handle
        .close()
        .await
        .with_context(|| format!("Failed to upload '{}'", args.name))?;

    Ok(TruncateOutput {
        name: args.name.clone(),
        previous_size_bytes,
        size_bytes: handle.size(),
    })
}
