//! Profile management
//!
//! A profile names one bucket on an S3-compatible endpoint together with the
//! credentials, retry and timeout settings used to reach it.

use serde::{Deserialize, Serialize};

use crate::config::ConfigManager;
use crate::error::{Error, Result};

/// Retry configuration for remote calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per remote call (first try included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    10000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Timeout configuration for a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_ms: u64,
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_timeout() -> u64 {
    30000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            read_ms: default_read_timeout(),
        }
    }
}

/// A named bucket on an S3-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Unique name for this profile
    pub name: String,

    /// S3 endpoint URL
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// Bucket every object name is resolved against
    pub bucket: String,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Bucket lookup style: "auto", "path", or "dns"
    #[serde(default = "default_bucket_lookup")]
    pub bucket_lookup: String,

    /// Listing page size override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    /// Retry configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Timeout configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket_lookup() -> String {
    "auto".to_string()
}

impl Profile {
    /// Create a new profile with required fields
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            region: default_region(),
            bucket_lookup: default_bucket_lookup(),
            page_size: None,
            retry: None,
            timeout: None,
        }
    }

    /// Check the endpoint and bucket before the profile is stored
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.endpoint)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Endpoint must use http or https: {}",
                self.endpoint
            )));
        }
        if self.bucket.is_empty() || self.bucket.contains('/') {
            return Err(Error::Config(format!("Invalid bucket name: '{}'", self.bucket)));
        }
        if !matches!(self.bucket_lookup.as_str(), "auto" | "path" | "dns") {
            return Err(Error::Config(format!(
                "Bucket lookup must be auto, path or dns: {}",
                self.bucket_lookup
            )));
        }
        Ok(())
    }

    /// Get the effective retry configuration
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Get the effective timeout configuration
    pub fn timeout_config(&self) -> TimeoutConfig {
        self.timeout.clone().unwrap_or_default()
    }
}

/// A profile chosen for a command, with its effective listing page size
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub profile: Profile,
    pub page_size: u32,
}

/// Reads and edits the profiles stored in the config file
///
/// Every edit is a full load, change and save of the file.
pub struct ProfileManager {
    config_manager: ConfigManager,
}

impl ProfileManager {
    /// Manager over a specific config file
    pub fn with_config_manager(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Manager over the default config location
    pub fn new() -> Result<Self> {
        Ok(Self::with_config_manager(ConfigManager::new()?))
    }

    /// Profiles in file order
    pub fn list(&self) -> Result<Vec<Profile>> {
        Ok(self.config_manager.load()?.profiles)
    }

    pub fn get(&self, name: &str) -> Result<Profile> {
        self.list()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::ProfileNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|p| p.name == name))
    }

    /// Store a new profile; an existing name is left untouched
    pub fn add(&self, profile: Profile) -> Result<()> {
        profile.validate()?;
        self.edit(|profiles| {
            if profiles.iter().any(|p| p.name == profile.name) {
                return Err(Error::ProfileExists(profile.name));
            }
            profiles.push(profile);
            Ok(())
        })
    }

    /// Store a profile, replacing one of the same name in place
    pub fn set(&self, profile: Profile) -> Result<()> {
        profile.validate()?;
        self.edit(|profiles| {
            match profiles.iter_mut().find(|p| p.name == profile.name) {
                Some(slot) => *slot = profile,
                None => profiles.push(profile),
            }
            Ok(())
        })
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        self.edit(|profiles| {
            let index = profiles
                .iter()
                .position(|p| p.name == name)
                .ok_or_else(|| Error::ProfileNotFound(name.to_string()))?;
            profiles.remove(index);
            Ok(())
        })
    }

    /// Pick the profile a command runs against
    ///
    /// A requested name must exist. Without one, a single configured profile
    /// is used; zero or several is a configuration error.
    pub fn resolve(&self, requested: Option<&str>) -> Result<ResolvedProfile> {
        let config = self.config_manager.load()?;
        let profile = select(&config.profiles, requested)?.clone();
        profile.validate()?;
        let page_size = config.page_size_for(&profile);
        Ok(ResolvedProfile { profile, page_size })
    }

    fn edit<T>(&self, change: impl FnOnce(&mut Vec<Profile>) -> Result<T>) -> Result<T> {
        let mut config = self.config_manager.load()?;
        let out = change(&mut config.profiles)?;
        self.config_manager.save(&config)?;
        Ok(out)
    }
}

fn select<'a>(profiles: &'a [Profile], requested: Option<&str>) -> Result<&'a Profile> {
    if let Some(name) = requested {
        return profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::ProfileNotFound(name.to_string()));
    }

    match profiles {
        [] => Err(Error::Config(
            "No profiles configured; add one with 'bkt profile set'".to_string(),
        )),
        [only] => Ok(only),
        _ => Err(Error::Config(
            "Several profiles are configured; choose one with --profile or BKT_PROFILE".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PAGE_SIZE;
    use tempfile::TempDir;

    fn temp_profile_manager() -> (ProfileManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_manager = ConfigManager::with_path(temp_dir.path().join("config.toml"));
        (ProfileManager::with_config_manager(config_manager), temp_dir)
    }

    fn profile(name: &str, bucket: &str) -> Profile {
        Profile::new(name, "http://localhost:9000", "access", "secret", bucket)
    }

    #[test]
    fn test_profile_defaults() {
        let p = profile("test", "data");
        assert_eq!(p.region, "us-east-1");
        assert_eq!(p.bucket_lookup, "auto");
        assert!(p.page_size.is_none());
        assert_eq!(p.retry_config(), RetryConfig::default());
        assert_eq!(p.timeout_config().read_ms, 30000);
    }

    #[test]
    fn test_profile_validate() {
        assert!(profile("ok", "data").validate().is_ok());

        let mut p = profile("bad", "data");
        p.endpoint = "not a url".into();
        assert!(matches!(p.validate(), Err(Error::InvalidUrl(_))));

        let mut p = profile("ftp", "data");
        p.endpoint = "ftp://host".into();
        assert!(matches!(p.validate(), Err(Error::Config(_))));

        assert!(profile("nested", "a/b").validate().is_err());
        assert!(profile("empty", "").validate().is_err());

        let mut p = profile("lookup", "data");
        p.bucket_lookup = "virtual".into();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_set_replaces_in_place() {
        let (manager, _temp_dir) = temp_profile_manager();
        manager.set(profile("logs", "logs-v1")).unwrap();
        manager.set(profile("media", "media")).unwrap();

        manager.set(profile("logs", "logs-v2")).unwrap();

        let buckets: Vec<_> = manager.list().unwrap().into_iter().map(|p| p.bucket).collect();
        assert_eq!(buckets, ["logs-v2", "media"]);
    }

    #[test]
    fn test_set_rejects_invalid_bucket() {
        let (manager, _temp_dir) = temp_profile_manager();
        assert!(matches!(
            manager.set(profile("bad", "a/b")),
            Err(Error::Config(_))
        ));
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_add_keeps_existing_bucket() {
        let (manager, _temp_dir) = temp_profile_manager();
        manager.add(profile("dup", "first")).unwrap();

        let result = manager.add(profile("dup", "second"));
        assert!(matches!(result, Err(Error::ProfileExists(name)) if name == "dup"));
        assert_eq!(manager.get("dup").unwrap().bucket, "first");
    }

    #[test]
    fn test_overrides_survive_storage() {
        let (manager, _temp_dir) = temp_profile_manager();
        let mut p = profile("tuned", "data");
        p.page_size = Some(50);
        p.retry = Some(RetryConfig {
            max_attempts: 5,
            ..Default::default()
        });
        manager.set(p).unwrap();

        let stored = manager.get("tuned").unwrap();
        assert_eq!(stored.page_size, Some(50));
        assert_eq!(stored.retry_config().max_attempts, 5);
        assert!(stored.timeout.is_none());
    }

    #[test]
    fn test_remove() {
        let (manager, _temp_dir) = temp_profile_manager();
        manager.set(profile("gone", "data")).unwrap();

        manager.remove("gone").unwrap();
        assert!(!manager.exists("gone").unwrap());
        assert!(matches!(
            manager.remove("gone"),
            Err(Error::ProfileNotFound(name)) if name == "gone"
        ));
    }

    #[test]
    fn test_resolve_single_profile_with_page_size() {
        let (manager, _temp_dir) = temp_profile_manager();
        assert!(matches!(manager.resolve(None), Err(Error::Config(_))));

        let mut p = profile("only", "data");
        p.page_size = Some(25);
        manager.set(p).unwrap();

        let resolved = manager.resolve(None).unwrap();
        assert_eq!(resolved.profile.bucket, "data");
        assert_eq!(resolved.page_size, 25);
    }

    #[test]
    fn test_resolve_by_name() {
        let (manager, _temp_dir) = temp_profile_manager();
        manager.set(profile("a", "alpha")).unwrap();
        manager.set(profile("b", "beta")).unwrap();

        assert!(matches!(manager.resolve(None), Err(Error::Config(_))));
        assert!(matches!(
            manager.resolve(Some("zzz")),
            Err(Error::ProfileNotFound(_))
        ));

        let resolved = manager.resolve(Some("b")).unwrap();
        assert_eq!(resolved.profile.bucket, "beta");
        assert_eq!(resolved.page_size, DEFAULT_PAGE_SIZE);
    }
}
