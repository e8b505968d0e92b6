//! Profile management commands
//!
//! A profile names one bucket on an S3-compatible endpoint together with the
//! credentials, paging and retry settings used to reach it.

use anyhow::Context;
use bkt_core::{Profile, ProfileManager, RetryBuilder, TimeoutConfig};
use clap::Subcommand;
use serde::Serialize;

use super::fail;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Profile subcommands
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Add or update a profile
    Set(SetArgs),

    /// List all configured profiles
    List(ListArgs),

    /// Remove a profile
    Remove(RemoveArgs),
}

/// Arguments for the `profile set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Profile name (e.g., "prod", "local")
    pub name: String,

    /// S3 endpoint URL (e.g., "http://localhost:9000")
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// Bucket the profile works in
    pub bucket: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    #[arg(long, default_value = "auto")]
    pub bucket_lookup: String,

    /// Listing page size for this profile
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Attempts per remote call, first try included
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Wait before the first retry, in milliseconds
    #[arg(long)]
    pub initial_backoff_ms: Option<u64>,

    /// Upper bound on any single wait, in milliseconds
    #[arg(long)]
    pub max_backoff_ms: Option<u64>,

    /// Connect timeout in milliseconds
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Read timeout in milliseconds
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Fail instead of replacing an existing profile
    #[arg(long)]
    pub no_clobber: bool,
}

/// Arguments for the `profile list` command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show endpoint details and settings
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the `profile remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the profile to remove
    pub name: String,
}

/// JSON output for profile list
#[derive(Serialize)]
struct ProfileListOutput {
    profiles: Vec<ProfileInfo>,
}

/// Profile information for output (without credentials)
#[derive(Serialize)]
struct ProfileInfo {
    name: String,
    endpoint: String,
    bucket: String,
    region: String,
    bucket_lookup: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,
    max_attempts: u32,
}

impl From<&Profile> for ProfileInfo {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            endpoint: profile.endpoint.clone(),
            bucket: profile.bucket.clone(),
            region: profile.region.clone(),
            bucket_lookup: profile.bucket_lookup.clone(),
            page_size: profile.page_size,
            max_attempts: profile.retry_config().max_attempts,
        }
    }
}

/// JSON output for profile set/remove operations
#[derive(Serialize)]
struct ProfileOperationOutput {
    success: bool,
    profile: String,
    message: String,
}

/// Execute a profile subcommand
pub fn execute(cmd: ProfileCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let manager = match ProfileManager::new() {
        Ok(m) => m,
        Err(e) => return fail(&formatter, anyhow::Error::new(e).context("Failed to load profiles")),
    };

    match run(cmd, &manager, &formatter) {
        Ok(()) => ExitCode::Success,
        Err(e) => fail(&formatter, e),
    }
}

fn run(cmd: ProfileCommands, manager: &ProfileManager, formatter: &Formatter) -> anyhow::Result<()> {
    match cmd {
        ProfileCommands::Set(args) => run_set(args, manager, formatter),
        ProfileCommands::List(args) => run_list(args, manager, formatter),
        ProfileCommands::Remove(args) => run_remove(args, manager, formatter),
    }
}

fn build_profile(args: SetArgs) -> Profile {
    let mut profile = Profile::new(
        args.name,
        args.endpoint,
        args.access_key,
        args.secret_key,
        args.bucket,
    );
    profile.region = args.region;
    profile.bucket_lookup = args.bucket_lookup;
    profile.page_size = args.page_size;

    if args.max_attempts.is_some()
        || args.initial_backoff_ms.is_some()
        || args.max_backoff_ms.is_some()
    {
        let mut builder = RetryBuilder::new();
        if let Some(n) = args.max_attempts {
            builder = builder.max_attempts(n);
        }
        if let Some(ms) = args.initial_backoff_ms {
            builder = builder.initial_backoff_ms(ms);
        }
        if let Some(ms) = args.max_backoff_ms {
            builder = builder.max_backoff_ms(ms);
        }
        profile.retry = Some(builder.build());
    }

    if args.connect_timeout_ms.is_some() || args.read_timeout_ms.is_some() {
        let defaults = TimeoutConfig::default();
        profile.timeout = Some(TimeoutConfig {
            connect_ms: args.connect_timeout_ms.unwrap_or(defaults.connect_ms),
            read_ms: args.read_timeout_ms.unwrap_or(defaults.read_ms),
        });
    }

    profile
}

fn run_set(args: SetArgs, manager: &ProfileManager, formatter: &Formatter) -> anyhow::Result<()> {
    let no_clobber = args.no_clobber;
    let profile = build_profile(args);
    let name = profile.name.clone();

    if no_clobber {
        manager.add(profile)
    } else {
        manager.set(profile)
    }
    .with_context(|| format!("Failed to save profile '{name}'"))?;

    if formatter.is_json() {
        formatter.json(&ProfileOperationOutput {
            success: true,
            profile: name.clone(),
            message: format!("Profile '{name}' configured successfully"),
        });
    } else {
        formatter.success(&format!("Profile '{name}' configured successfully."));
    }
    Ok(())
}

fn run_list(args: ListArgs, manager: &ProfileManager, formatter: &Formatter) -> anyhow::Result<()> {
    let profiles = manager.list().context("Failed to list profiles")?;

    if formatter.is_json() {
        formatter.json(&ProfileListOutput {
            profiles: profiles.iter().map(ProfileInfo::from).collect(),
        });
    } else if profiles.is_empty() {
        formatter.println("No profiles configured.");
    } else if args.long {
        let rows = profiles
            .iter()
            .map(|p| {
                vec![
                    p.name.clone(),
                    p.endpoint.clone(),
                    p.bucket.clone(),
                    p.region.clone(),
                    p.bucket_lookup.clone(),
                    p.retry_config().max_attempts.to_string(),
                ]
            })
            .collect();
        formatter.table(
            &["NAME", "ENDPOINT", "BUCKET", "REGION", "LOOKUP", "ATTEMPTS"],
            rows,
        );
    } else {
        let rows = profiles
            .iter()
            .map(|p| vec![p.name.clone(), p.bucket.clone()])
            .collect();
        formatter.table(&["NAME", "BUCKET"], rows);
    }
    Ok(())
}

fn run_remove(args: RemoveArgs, manager: &ProfileManager, formatter: &Formatter) -> anyhow::Result<()> {
    manager
        .remove(&args.name)
        .with_context(|| format!("Failed to remove profile '{}'", args.name))?;

    if formatter.is_json() {
        formatter.json(&ProfileOperationOutput {
            success: true,
            profile: args.name.clone(),
            message: format!("Profile '{}' removed successfully", args.name),
        });
    } else {
        formatter.success(&format!("Profile '{}' removed successfully.", args.name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bkt_core::ConfigManager;
    use tempfile::TempDir;

    fn temp_manager() -> (TempDir, ProfileManager) {
        let dir = TempDir::new().unwrap();
        let config = ConfigManager::with_path(dir.path().join("config.toml"));
        (dir, ProfileManager::with_config_manager(config))
    }

    fn quiet() -> Formatter {
        Formatter::new(OutputConfig {
            quiet: true,
            ..Default::default()
        })
    }

    fn set_args(name: &str) -> SetArgs {
        SetArgs {
            name: name.to_string(),
            endpoint: "http://localhost:9000".to_string(),
            access_key: "accesskey".to_string(),
            secret_key: "secretkey".to_string(),
            bucket: "data".to_string(),
            region: "us-east-1".to_string(),
            bucket_lookup: "auto".to_string(),
            page_size: None,
            max_attempts: None,
            initial_backoff_ms: None,
            max_backoff_ms: None,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            no_clobber: false,
        }
    }

    #[test]
    fn test_build_profile_defaults_leave_overrides_unset() {
        let profile = build_profile(set_args("local"));
        assert_eq!(profile.bucket, "data");
        assert!(profile.retry.is_none());
        assert!(profile.timeout.is_none());
    }

    #[test]
    fn test_build_profile_retry_overrides() {
        let mut args = set_args("local");
        args.max_attempts = Some(5);
        args.read_timeout_ms = Some(1000);

        let profile = build_profile(args);
        let retry = profile.retry.unwrap();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_backoff_ms, 100);

        let timeout = profile.timeout.unwrap();
        assert_eq!(timeout.read_ms, 1000);
        assert_eq!(timeout.connect_ms, TimeoutConfig::default().connect_ms);
    }

    #[test]
    fn test_set_list_remove() {
        let (_dir, manager) = temp_manager();
        let formatter = quiet();

        run(ProfileCommands::Set(set_args("local")), &manager, &formatter).unwrap();
        assert!(manager.exists("local").unwrap());

        run(
            ProfileCommands::List(ListArgs { long: true }),
            &manager,
            &formatter,
        )
        .unwrap();

        run(
            ProfileCommands::Remove(RemoveArgs {
                name: "local".to_string(),
            }),
            &manager,
            &formatter,
        )
        .unwrap();
        assert!(!manager.exists("local").unwrap());
    }

    #[test]
    fn test_no_clobber_conflicts() {
        let (_dir, manager) = temp_manager();
        let formatter = quiet();

        run(ProfileCommands::Set(set_args("local")), &manager, &formatter).unwrap();

        let mut args = set_args("local");
        args.no_clobber = true;
        let err = run(ProfileCommands::Set(args), &manager, &formatter).unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::Conflict);
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let (_dir, manager) = temp_manager();
        let err = run(
            ProfileCommands::Remove(RemoveArgs {
                name: "ghost".to_string(),
            }),
            &manager,
            &quiet(),
        )
        .unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
    }

    #[test]
    fn test_invalid_endpoint_is_usage_error() {
        let (_dir, manager) = temp_manager();
        let mut args = set_args("bad");
        args.endpoint = "ftp://example.com".to_string();

        let err = run(ProfileCommands::Set(args), &manager, &quiet()).unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::UsageError);
    }

    #[test]
    fn test_profile_info_hides_credentials() {
        let profile = build_profile(set_args("local"));
        let json = serde_json::to_string(&ProfileInfo::from(&profile)).unwrap();
        assert!(!json.contains("secretkey"));
        assert!(!json.contains("accesskey"));
    }
}
