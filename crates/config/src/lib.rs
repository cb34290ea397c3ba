//! Layered configuration for hoard.
//!
//! Values are resolved, lowest priority first, from built-in defaults, an
//! optional TOML/YAML/JSON file, and `HOARD_*` environment variables where
//! `__` separates nesting levels (`HOARD_FETCH__MAX_ATTEMPTS=3`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use hoard_fetch::{DEFAULT_PROTOCOL, RetryPolicy, SecondarySettings, Transport, TransportSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "HOARD_";
/// Looked up in the platform configuration directory when no file is given.
pub const DEFAULT_FILE_NAME: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "hoard")
}

/// Path of the configuration file used when none is given explicitly.
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub snapshots: SnapshotConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
}

/// The on-disk asset collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub root: PathBuf,
    /// Asset file extension, leading `.` optional.
    pub extension: String,
    /// Directory-name suffixes that classify the assets inside them.
    pub classification_tags: Vec<String>,
}
impl Default for LibraryConfig {
    fn default() -> Self {
        let root = match project_dirs() {
            Some(dirs) => dirs.data_dir().join("library"),
            None => PathBuf::from("library"),
        };
        Self { root, extension: "jpg".to_string(), classification_tags: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub directory: PathBuf,
    pub extension: String,
}
impl Default for SnapshotConfig {
    fn default() -> Self {
        let directory = match project_dirs() {
            Some(dirs) => dirs.data_dir().join("snapshots"),
            None => PathBuf::from("snapshots"),
        };
        Self { directory, extension: "json".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
    /// Ignore the cache and always rebuild from the filesystem and snapshots.
    pub force_rescan: bool,
}
impl Default for CacheConfig {
    fn default() -> Self {
        let path = match project_dirs() {
            Some(dirs) => dirs.cache_dir().join("inventory.bin"),
            None => PathBuf::from("inventory.bin"),
        };
        Self { path, force_rescan: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Registered transport name, see [`Transport::names`].
    pub transport: String,
    /// Where downloads land. Defaults to the library root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    /// Prefix every URL must start with.
    pub protocol: String,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    /// Number of URLs fetched at once.
    pub concurrency: usize,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub secondary: SecondaryConfig,
}
impl Default for FetchConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        let transport = TransportSettings::default();
        Self {
            transport: "stream".to_string(),
            destination: None,
            protocol: DEFAULT_PROTOCOL.to_string(),
            max_attempts: policy.max_attempts,
            retry_delay_secs: policy.retry_delay.as_secs(),
            concurrency: 1,
            user_agent: transport.user_agent,
            timeout_secs: transport.timeout.as_secs(),
            secondary: SecondaryConfig::default(),
        }
    }
}
impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: self.max_attempts, retry_delay: Duration::from_secs(self.retry_delay_secs) }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            secondary: self.secondary.clone().into(),
        }
    }

    /// The download directory, falling back to the library root.
    pub fn destination<'a>(&'a self, library: &'a LibraryConfig) -> &'a Path {
        self.destination.as_deref().unwrap_or(&library.root)
    }
}

/// External downloader used by the `secondary` transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryConfig {
    pub enabled: bool,
    pub command: String,
    /// `{url}` and `{output}` are substituted on every attempt.
    pub args: Vec<String>,
    pub connection_failure_codes: Vec<i32>,
    pub min_size_kb: u64,
}
impl Default for SecondaryConfig {
    fn default() -> Self {
        let settings = SecondarySettings::default();
        Self {
            enabled: settings.enabled,
            command: settings.command,
            args: settings.args,
            connection_failure_codes: settings.connection_failure_codes,
            min_size_kb: settings.min_size_kb,
        }
    }
}
impl From<SecondaryConfig> for SecondarySettings {
    fn from(config: SecondaryConfig) -> Self {
        Self {
            enabled: config.enabled,
            command: config.command,
            args: config.args,
            connection_failure_codes: config.connection_failure_codes,
            min_size_kb: config.min_size_kb,
        }
    }
}

impl Config {
    /// Builds the provider stack without extracting it.
    ///
    /// An explicit `file` must exist. Without one, the default configuration
    /// file is merged in only if it exists.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match file {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path)?;
            },
            None => {
                if let Some(path) = default_config_file().filter(|path| path.is_file()) {
                    tracing::debug!(path = %path.display(), "Using default configuration file");
                    figment = merge_file(figment, &path)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Loads and validates the configuration.
    #[tracing::instrument(skip_all, fields(file = ?file))]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(file)?)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Config = figment.extract().map_err(|err| ErrorKind::Extract(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.library.extension.trim_start_matches('.').is_empty() {
            exn::bail!(ErrorKind::Invalid { field: "library.extension", reason: "must not be empty".to_string() });
        }
        if self.snapshots.extension.trim_start_matches('.').is_empty() {
            exn::bail!(ErrorKind::Invalid { field: "snapshots.extension", reason: "must not be empty".to_string() });
        }
        if self.fetch.protocol.is_empty() {
            exn::bail!(ErrorKind::Invalid { field: "fetch.protocol", reason: "must not be empty".to_string() });
        }
        if self.fetch.max_attempts == 0 {
            exn::bail!(ErrorKind::Invalid { field: "fetch.max_attempts", reason: "must be at least 1".to_string() });
        }
        if self.fetch.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid { field: "fetch.concurrency", reason: "must be at least 1".to_string() });
        }
        let transport = self.fetch.transport.trim().to_lowercase();
        if !Transport::names().any(|name| name == transport) {
            let known = Transport::names().collect::<Vec<_>>().join(", ");
            exn::bail!(ErrorKind::Invalid {
                field: "fetch.transport",
                reason: format!("unknown transport {:?} (expected one of: {known})", self.fetch.transport),
            });
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase);
    let figment = match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(figment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn load_in(jail: &Jail, file: Option<&str>) -> Result<Config> {
        let path = file.map(|name| jail.directory().join(name));
        Config::load(path.as_deref())
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.library.extension, "jpg");
        assert_eq!(config.snapshots.extension, "json");
        assert!(!config.cache.force_rescan);
        assert_eq!(config.fetch.retry_policy(), RetryPolicy::default());
        assert_eq!(config.fetch.concurrency, 1);
        assert_eq!(config.fetch.transport_settings().secondary, SecondarySettings::default());
        assert_eq!(config.fetch.destination(&config.library), config.library.root.as_path());
    }

    #[test]
    fn test_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hoard.toml",
                r#"
                [library]
                root = "/srv/pictures"
                classification_tags = ["_favourites", "_archive"]

                [fetch]
                transport = "secondary"
                max_attempts = 2

                [fetch.secondary]
                min_size_kb = 4
                "#,
            )?;
            let config = load_in(jail, Some("hoard.toml")).unwrap();
            assert_eq!(config.library.root, PathBuf::from("/srv/pictures"));
            assert_eq!(config.library.classification_tags, vec!["_favourites", "_archive"]);
            assert_eq!(config.library.extension, "jpg");
            assert_eq!(config.fetch.transport, "secondary");
            assert_eq!(config.fetch.max_attempts, 2);
            assert_eq!(config.fetch.secondary.min_size_kb, 4);
            assert_eq!(config.fetch.secondary.command, "curl");
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("hoard.yaml", "fetch:\n  max_attempts: 2\n  retry_delay_secs: 1\n")?;
            jail.set_env("HOARD_FETCH__MAX_ATTEMPTS", "7");
            jail.set_env("HOARD_CACHE__FORCE_RESCAN", "true");
            jail.set_env("HOARD_FETCH__DESTINATION", "/tmp/downloads");
            let config = load_in(jail, Some("hoard.yaml")).unwrap();
            assert_eq!(config.fetch.max_attempts, 7);
            assert_eq!(config.fetch.retry_policy().retry_delay, Duration::from_secs(1));
            assert!(config.cache.force_rescan);
            assert_eq!(config.fetch.destination(&config.library), Path::new("/tmp/downloads"));
            Ok(())
        });
    }

    #[test]
    fn test_json_file() {
        Jail::expect_with(|jail| {
            jail.create_file("hoard.json", r#"{"snapshots": {"directory": "/var/hoard/logs"}}"#)?;
            let config = load_in(jail, Some("hoard.json")).unwrap();
            assert_eq!(config.snapshots.directory, PathBuf::from("/var/hoard/logs"));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            let err = load_in(jail, Some("nope.toml")).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_format() {
        Jail::expect_with(|jail| {
            jail.create_file("hoard.ini", "[fetch]\n")?;
            let err = load_in(jail, Some("hoard.ini")).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_value() {
        Jail::expect_with(|jail| {
            jail.set_env("HOARD_FETCH__MAX_ATTEMPTS", "lots");
            let err = load_in(jail, None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Extract(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("HOARD_FETCH__MAX_ATTEMPTS", "0", "fetch.max_attempts")]
    #[case("HOARD_FETCH__CONCURRENCY", "0", "fetch.concurrency")]
    #[case("HOARD_FETCH__TRANSPORT", "pigeon", "fetch.transport")]
    #[case("HOARD_LIBRARY__EXTENSION", ".", "library.extension")]
    #[case("HOARD_SNAPSHOTS__EXTENSION", "..", "snapshots.extension")]
    fn test_validation(#[case] key: &str, #[case] value: &str, #[case] expected: &str) {
        Jail::expect_with(|jail| {
            jail.set_env(key, value);
            let err = load_in(jail, None).unwrap_err();
            match &*err {
                ErrorKind::Invalid { field, .. } => assert_eq!(*field, expected),
                other => panic!("unexpected error: {other}"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_transport_name_is_case_insensitive() {
        Jail::expect_with(|jail| {
            jail.set_env("HOARD_FETCH__TRANSPORT", "Secondary");
            assert!(load_in(jail, None).is_ok());
            Ok(())
        });
    }
}
