//! rm command - Remove objects
//!
//! Deletes each named object from the bucket. Deleting a name that does not
//! exist succeeds.

use anyhow::Context;
use bkt_core::Store;
use clap::Args;
use serde::Serialize;

use super::{fail, open_store};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Remove objects
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Object name(s) to remove
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Only show what would be deleted (dry run)
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Default, Serialize)]
struct RmOutput {
    status: &'static str,
    deleted: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<String>,
    total: usize,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, profile: Option<&str>, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let store = match open_store(profile).await {
        Ok(store) => store,
        Err(e) => return fail(&formatter, e),
    };

    let (output, code) = remove_all(&store, &args, &formatter).await;

    if formatter.is_json() {
        formatter.json(&output);
    } else if args.dry_run {
        for name in &output.deleted {
            formatter.println(&format!("Would remove: {name}"));
        }
    } else if !output.deleted.is_empty() {
        formatter.success(&format!("Removed {} object(s).", output.deleted.len()));
    }

    code
}

/// Delete every name, continuing past failures
///
/// Returns the exit code of the first failure. Authentication failures stop
/// the run since every later delete would fail the same way.
async fn remove_all(store: &Store, args: &RmArgs, formatter: &Formatter) -> (RmOutput, ExitCode) {
    let mut output = RmOutput::default();
    let mut code = ExitCode::Success;

    for name in &args.names {
        if args.dry_run {
            output.deleted.push(name.clone());
            continue;
        }

        match store
            .delete(name)
            .await
            .with_context(|| format!("Failed to remove '{name}'"))
        {
            Ok(()) => output.deleted.push(name.clone()),
            Err(e) => {
                output.failed.push(name.clone());
                let failure = fail(formatter, e);
                if code == ExitCode::Success {
                    code = failure;
                }
                if failure == ExitCode::AuthError {
                    break;
                }
            }
        }
    }

    output.total = output.deleted.len();
    output.status = match (output.deleted.is_empty(), output.failed.is_empty()) {
        (_, true) => "success",
        (false, false) => "partial",
        (true, false) => "failed",
    };
    (output, code)
}
