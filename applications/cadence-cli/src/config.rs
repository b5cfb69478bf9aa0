/// Application configuration
use cadence_core::{Session, SessionContext};
use cadence_remote::RemoteConfig;
use cadence_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "cadence.toml";

/// Prefix of environment overrides, e.g. `CADENCE_REMOTE__URL`
pub const ENV_PREFIX: &str = "CADENCE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub migration: MigrationSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct RemoteSettings {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub anon_key: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Signed-in user; without it every command runs as a guest
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub access_token: Option<String>,
}

// Keep tokens out of logs
impl std::fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_realtime")]
    pub realtime: bool,

    #[serde(default = "default_realtime_retry_secs")]
    pub realtime_retry_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationSettings {
    /// Directory holding the legacy `<key>.json` collections
    #[serde(default = "default_legacy_dir")]
    pub legacy_dir: PathBuf,

    /// Error messages shown in the migration summary
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,
}

impl AppConfig {
    /// Load `cadence.toml` (or `path`) and `CADENCE_` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, None)
    }

    /// Load with an explicit environment instead of the process one
    pub fn load_from(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut settings = config::Config::builder();

        // An explicit path must exist; the default file is optional
        settings = match path {
            Some(path) => settings.add_source(config::File::from(path)),
            None => settings
                .add_source(config::File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false)),
        };

        // Double underscore separates sections: CADENCE_SYNC__INTERVAL_SECS
        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.remote.url.is_empty() {
            return Err(ConfigError::Invalid(
                "Backend URL is required (set CADENCE_REMOTE__URL)".to_string(),
            ));
        }

        if self.sync.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "Sync interval must be at least one second".to_string(),
            ));
        }

        if self.remote.page_size == 0 {
            return Err(ConfigError::Invalid("Page size must be positive".to_string()));
        }

        if self.remote.user_id.is_some() != self.remote.access_token.is_some() {
            return Err(ConfigError::Invalid(
                "user_id and access_token must be set together".to_string(),
            ));
        }

        Ok(())
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            url: self.remote.url.clone(),
            anon_key: self.remote.anon_key.clone(),
            timeout_secs: self.remote.timeout_secs,
            page_size: self.remote.page_size,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_secs(self.sync.interval_secs),
            realtime: self.sync.realtime,
            realtime_retry: Duration::from_secs(self.sync.realtime_retry_secs),
        }
    }

    /// Session for the configured user, or a guest context
    pub fn session(&self) -> SessionContext {
        match (&self.remote.user_id, &self.remote.access_token) {
            (Some(user_id), Some(token)) => {
                SessionContext::signed_in(Session::new(user_id.clone(), token.clone()))
            }
            _ => SessionContext::new(),
        }
    }
}

// Default values
fn default_database_url() -> String {
    "sqlite://./data/cadence.db".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    cadence_remote::DEFAULT_PAGE_SIZE
}

fn default_interval_secs() -> u64 {
    cadence_sync::DEFAULT_INTERVAL.as_secs()
}

fn default_realtime() -> bool {
    true
}

fn default_realtime_retry_secs() -> u64 {
    30
}

fn default_legacy_dir() -> PathBuf {
    PathBuf::from("./data/legacy")
}

fn default_max_errors() -> usize {
    5
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            user_id: None,
            access_token: None,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            realtime: default_realtime(),
            realtime_retry_secs: default_realtime_retry_secs(),
        }
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            legacy_dir: default_legacy_dir(),
            max_errors: default_max_errors(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = AppConfig::load_from(None, env(&[])).unwrap();
        assert_eq!(config.sync.interval_secs, 300);
        assert!(config.sync.realtime);
        assert_eq!(config.storage.database_url, "sqlite://./data/cadence.db");
        assert!(!config.session().is_authenticated());
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.toml");
        std::fs::write(
            &path,
            r#"
            [remote]
            url = "https://project.example.co"
            anon_key = "anon"

            [sync]
            interval_secs = 60
            realtime = false
            "#,
        )
        .unwrap();

        let config = AppConfig::load_from(Some(&path), env(&[])).unwrap();
        assert_eq!(config.remote.url, "https://project.example.co");
        assert_eq!(config.sync_config().interval, Duration::from_secs(60));
        assert!(!config.sync_config().realtime);
        config.validate().unwrap();
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.toml");
        std::fs::write(&path, "[sync]\ninterval_secs = 60\n").unwrap();

        let config = AppConfig::load_from(
            Some(&path),
            env(&[
                ("CADENCE_SYNC__INTERVAL_SECS", "15"),
                ("CADENCE_REMOTE__URL", "https://other.example.co"),
                ("CADENCE_REMOTE__USER_ID", "user-1"),
                ("CADENCE_REMOTE__ACCESS_TOKEN", "jwt"),
            ]),
        )
        .unwrap();

        assert_eq!(config.sync.interval_secs, 15);
        assert_eq!(config.remote.url, "https://other.example.co");
        assert_eq!(config.session().user_id().as_deref(), Some("user-1"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.remote.url = "https://project.example.co".to_string();
        config.validate().unwrap();

        config.sync.interval_secs = 0;
        assert!(config.validate().is_err());
        config.sync.interval_secs = 10;

        config.remote.user_id = Some("user-1".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_hides_token() {
        let mut config = AppConfig::default();
        config.remote.access_token = Some("secret-token".to_string());
        assert!(!format!("{config:?}").contains("secret-token"));
    }
}
