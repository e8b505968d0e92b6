//! cat command - Display object contents
//!
//! Opens the object read-only, which downloads it into the handle buffer,
//! then streams the buffer to stdout.

use std::io::{self, Write};

use anyhow::Context;
use bkt_core::AccessLevel;
use clap::Args;

use super::{fail, open_store};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Display object contents
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Object name
    pub name: String,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, profile: Option<&str>, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    match run(&args, profile).await {
        Ok(()) => ExitCode::Success,
        Err(e) => fail(&formatter, e),
    }
}

async fn run(args: &CatArgs, profile: Option<&str>) -> anyhow::Result<()> {
    let mut store = open_store(profile).await?;
    let handle = store
        .get(&args.name)
        .await
        .with_context(|| format!("Failed to resolve '{}'", args.name))?;

    handle
        .open(AccessLevel::ReadOnly)
        .await
        .with_context(|| format!("Failed to open '{}'", args.name))?;

    // Raw bytes go straight to stdout, bypassing the formatter
    let mut stdout = io::stdout().lock();
    let copied = io::copy(&mut *handle, &mut stdout)
        .and_then(|n| stdout.flush().map(|()| n))
        .context("Failed to write to stdout");

    handle.close().await?;
    let bytes = copied?;
    tracing::debug!(name = %args.name, bytes, "Printed object");
    Ok(())
}
