//! put command - Write stdin into an object
//!
//! Stdin is buffered in an object handle and uploaded once when the handle
//! is closed. Without `--append` the previous content is replaced.

use std::io;

use anyhow::Context;
use bkt_core::metadata::CONTENT_TYPE;
use bkt_core::{AccessLevel, Error, ObjectHandle, Store};
use clap::Args;
use serde::Serialize;

use super::{fail, open_store};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// Write stdin into an object
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Object name
    pub name: String,

    /// Fail if the object already exists
    #[arg(long)]
    pub create: bool,

    /// Keep the existing content and add stdin after it
    #[arg(long, conflicts_with = "create")]
    pub append: bool,

    /// Content type to store (guessed from the name when omitted)
    #[arg(long)]
    pub content_type: Option<String>,

    /// User metadata entry, repeatable
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    name: String,
    size_bytes: u64,
    size_human: String,
    content_type: String,
}

/// Parse a `KEY=VALUE` metadata argument
fn parse_meta(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("metadata key is empty in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Execute the put command
pub async fn execute(args: PutArgs, profile: Option<&str>, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let result = async {
        let mut store = open_store(profile).await?;
        let mut stdin = io::stdin().lock();
        put(&mut store, &args, &mut stdin, &formatter).await
    }
    .await;

    match result {
        Ok(output) => {
            if formatter.is_json() {
                formatter.json(&output);
            } else {
                formatter.success(&format!(
                    "Wrote {} to '{}' ({}).",
                    output.size_human, output.name, output.content_type
                ));
            }
            ExitCode::Success
        }
        Err(e) => fail(&formatter, e),
    }
}

/// Handle to write into: a fresh object, or the existing one when allowed
async fn target<'a>(store: &'a mut Store, args: &PutArgs) -> anyhow::Result<&'a mut ObjectHandle> {
    if args.create {
        return store
            .new_object(&args.name)
            .await
            .with_context(|| format!("Failed to create '{}'", args.name));
    }

    let exists = match store.get(&args.name).await {
        Ok(_) => true,
        Err(Error::ObjectNotFound(_)) => false,
        Err(e) => return Err(e).with_context(|| format!("Failed to resolve '{}'", args.name)),
    };

    if exists {
        store
            .handle_mut(&args.name)
            .with_context(|| format!("Handle for '{}' was not registered", args.name))
    } else {
        store
            .new_object(&args.name)
            .await
            .with_context(|| format!("Failed to create '{}'", args.name))
    }
}

async fn put(
    store: &mut Store,
    args: &PutArgs,
    input: &mut impl io::Read,
    formatter: &Formatter,
) -> anyhow::Result<PutOutput> {
    let handle = target(store, args).await?;

    if let Some(content_type) = &args.content_type {
        handle.metadata_mut().insert(CONTENT_TYPE, content_type.as_str());
    }
    for (key, value) in &args.meta {
        handle.metadata_mut().insert(key.as_str(), value.as_str());
    }

    handle
        .open(AccessLevel::ReadWrite)
        .await
        .with_context(|| format!("Failed to open '{}'", args.name))?;

    if !args.append {
        handle.truncate(0)?;
    }

    // On a read failure the session is left open so nothing is uploaded
    io::copy(input, &mut *handle).context("Failed to read input")?;

    let spinner = ProgressBar::spinner(formatter.config(), &format!("Uploading {}", args.name));
    let closed = handle.close().await;
    spinner.finish_and_clear();
    closed.with_context(|| format!("Failed to upload '{}'", args.name))?;

    let size_bytes = handle.size();
    let content_type = handle
        .metadata()
        .content_type()
        .unwrap_or_default()
        .to_string();

    Ok(PutOutput {
        name: args.name.clone(),
        size_bytes,
        size_human: humansize::format_size(size_bytes, humansize::BINARY),
        content_type,
    })
}
