//! Configuration management for Coldvault
//!
//! Sources, in order of precedence:
//! 1. Environment variables (`COLDVAULT__ARCHIVE__CLUSTER_NAME=...`)
//! 2. Config file named by the `COLDVAULT_CONFIG` env var
//! 3. `./config/coldvault.{yaml,toml,json}`
//! 4. `/etc/coldvault/coldvault.{yaml,toml,json}`
//! 5. Hardcoded defaults

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::bucket::BucketFormat;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ColdvaultConfig {
    #[serde(default)]
    pub archive: ArchiveConfiguration,

    #[serde(default)]
    pub locations: LocationsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub thaw: ThawConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ColdvaultConfig {
    /// Load configuration from all sources and validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Ok(config_path) = std::env::var("COLDVAULT_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder
            .add_source(File::with_name("./config/coldvault").required(false))
            .add_source(File::with_name("/etc/coldvault/coldvault").required(false));

        // Example: COLDVAULT__ARCHIVE__SERVER_NAME=indexer-07
        builder = builder.add_source(
            Environment::with_prefix("COLDVAULT")
                .separator("__")
                .try_parsing(true),
        );

        let config: ColdvaultConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ColdvaultConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.archive.validate()?;

        let locations = [
            ("locations.safe_location", &self.locations.safe_location),
            ("locations.fail_location", &self.locations.fail_location),
            ("locations.lock_location", &self.locations.lock_location),
        ];
        for (key, path) in locations {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Message(format!("{key} cannot be empty")));
            }
        }
        if self.locations.safe_location == self.locations.fail_location {
            return Err(ConfigError::Message(
                "locations.safe_location and locations.fail_location must differ".to_string(),
            ));
        }

        if self.thaw.format_priority.is_empty() {
            return Err(ConfigError::Message(
                "thaw.format_priority must name at least one format".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Message(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::Message(format!(
                "logging.format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}

/// Where on the archive file system buckets are placed.
///
/// Loaded once and never mutated; only the path resolver reads it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveConfiguration {
    /// Cluster the indexer belongs to. Keeps clusters apart in a shared archive.
    pub cluster_name: String,

    /// Name of this indexer within the cluster.
    pub server_name: String,

    /// Root of archived data on the archive file system.
    pub archive_root_path: String,

    /// Root under which transfers are staged before being published.
    pub archive_temp_root_path: String,

    /// Server names of the peers whose buckets this server replicates, keyed
    /// by the peer GUID found in replica bucket names.
    pub peer_server_names: BTreeMap<String, String>,
}

impl ArchiveConfiguration {
    pub fn new(
        cluster_name: impl Into<String>,
        server_name: impl Into<String>,
        archive_root_path: impl Into<String>,
        archive_temp_root_path: impl Into<String>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            server_name: server_name.into(),
            archive_root_path: archive_root_path.into(),
            archive_temp_root_path: archive_temp_root_path.into(),
            peer_server_names: BTreeMap::new(),
        }
    }

    /// Maps a peer GUID to the server name it archives under.
    #[must_use]
    pub fn with_peer(mut self, guid: impl Into<String>, server_name: impl Into<String>) -> Self {
        self.peer_server_names.insert(guid.into(), server_name.into());
        self
    }

    /// Server name of the peer with this GUID. GUIDs compare case-insensitively.
    pub fn peer_server_name(&self, guid: &str) -> Option<&str> {
        self.peer_server_names
            .iter()
            .find(|(peer, _)| peer.eq_ignore_ascii_case(guid))
            .map(|(_, server)| server.as_str())
    }

    /// Validate that the configuration yields unambiguous paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("archive.cluster_name", &self.cluster_name),
            ("archive.server_name", &self.server_name),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Message(format!("{key} cannot be empty")));
            }
            if value.contains('/') {
                return Err(ConfigError::Message(format!(
                    "{key} cannot contain `/`"
                )));
            }
        }
        for (guid, server) in &self.peer_server_names {
            if server.is_empty() || server.contains('/') {
                return Err(ConfigError::Message(format!(
                    "archive.peer_server_names.{guid} must be a non-empty name without `/`"
                )));
            }
        }

        if !self.archive_root_path.starts_with('/') {
            return Err(ConfigError::Message(
                "archive.archive_root_path must start with `/`".to_string(),
            ));
        }
        if !self.archive_temp_root_path.starts_with('/') {
            return Err(ConfigError::Message(
                "archive.archive_temp_root_path must start with `/`".to_string(),
            ));
        }
        if self.archive_root_path.trim_end_matches('/')
            == self.archive_temp_root_path.trim_end_matches('/')
        {
            return Err(ConfigError::Message(
                "archive.archive_temp_root_path must differ from archive.archive_root_path"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ArchiveConfiguration {
    fn default() -> Self {
        Self {
            cluster_name: "default".to_string(),
            server_name: "localhost".to_string(),
            archive_root_path: "/archive_data".to_string(),
            archive_temp_root_path: "/archive_temp".to_string(),
            peer_server_names: BTreeMap::new(),
        }
    }
}

/// Local holding areas used while a bucket is in flight.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocationsConfig {
    /// Buckets are moved here before the archive attempt.
    pub safe_location: PathBuf,

    /// Buckets whose archive attempt failed wait here for the next sweep.
    pub fail_location: PathBuf,

    /// Per-bucket lock files for the recovery sweep.
    pub lock_location: PathBuf,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        let home = user_directory();
        Self {
            safe_location: home.join("coldvault-safe-buckets"),
            fail_location: home.join("coldvault-failed-buckets"),
            lock_location: home.join("coldvault-bucket-locks"),
        }
    }
}

/// Archive backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory that backs the local-filesystem archive backend.
    pub local_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_root: user_directory().join("coldvault-archive"),
        }
    }
}

/// Thaw configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThawConfig {
    /// Thawed buckets land in `<thaw_location>/<index>/<bucket>`.
    pub thaw_location: PathBuf,

    /// Preferred format when a bucket is archived in more than one.
    pub format_priority: Vec<BucketFormat>,
}

impl Default for ThawConfig {
    fn default() -> Self {
        Self {
            thaw_location: user_directory().join("coldvault-thawed-buckets"),
            format_priority: vec![BucketFormat::Native, BucketFormat::Csv],
        }
    }
}

/// HTTP trigger surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9090,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn user_directory() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}
