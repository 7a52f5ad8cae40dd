//! Configuration types for dataset-dl

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, path::PathBuf, time::Duration};

/// Main configuration for [`DatasetService`](crate::DatasetService)
///
/// Every field has a default, so `Config::default()` works out of the box and
/// partial JSON documents deserialize cleanly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Legacy archive lookups
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Recovery of legacy files into local storage
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Download statistics read path
    #[serde(default)]
    pub stats: StatsConfig,

    /// Usage logging behavior
    #[serde(default)]
    pub logging: UsageLoggingConfig,

    /// Action token verification
    #[serde(default)]
    pub auth: AuthConfig,

    /// External identity service (legal acceptance state)
    #[serde(default)]
    pub identity: IdentityConfig,

    /// REST API
    #[serde(default)]
    pub api: ApiConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./dataset-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Legacy archive client configuration
///
/// A lookup URL is `base_url + site_paths[origin_site_id] + rest_prefix + route`,
/// where `route` is `route_base/<dataset id>` with the dataset ID substituted by
/// the original post ID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Legacy archive origin (default: "https://legacy.pewresearch.org")
    #[serde(default = "default_archive_base_url")]
    pub base_url: String,

    /// REST prefix appended after the site path (default: "/wp-json")
    #[serde(default = "default_rest_prefix")]
    pub rest_prefix: String,

    /// REST route of a dataset without its ID (default: "/wp/v2/dataset")
    #[serde(default = "default_route_base")]
    pub route_base: String,

    /// Origin site ID -> site path; unknown sites map to ""
    #[serde(default = "default_site_paths")]
    pub site_paths: HashMap<i64, String>,

    /// JSON field carrying the download URL (default: "dataset_download_url")
    #[serde(default = "default_media_field")]
    pub media_field: String,

    /// Overall request deadline (default: 30 seconds)
    #[serde(default = "default_archive_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_archive_base_url(),
            rest_prefix: default_rest_prefix(),
            route_base: default_route_base(),
            site_paths: default_site_paths(),
            media_field: default_media_field(),
            timeout: default_archive_timeout(),
        }
    }
}

/// Recovery worker configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Run the background recovery worker (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory recovered files are written to (default: "./datasets")
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Public URL prefix of `storage_dir` (default: "/datasets")
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// How often the worker re-checks the queue when idle (default: 30 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Per-request deadline for fetching a legacy file (default: 300 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Retry policy for transient fetch failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_dir: default_storage_dir(),
            public_base_url: default_public_base_url(),
            poll_interval: default_poll_interval(),
            fetch_timeout: default_fetch_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Download statistics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Cache entry lifetime (default: 24 hours)
    #[serde(default = "default_stats_ttl", with = "duration_serde")]
    pub ttl: Duration,

    /// First year included in the monthly log (default: 2020)
    #[serde(default = "default_start_year")]
    pub start_year: i32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            ttl: default_stats_ttl(),
            start_year: default_start_year(),
        }
    }
}

/// Usage logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageLoggingConfig {
    /// Log a download in the background whenever get-download succeeds (default: true)
    #[serde(default = "default_true")]
    pub log_on_resolve: bool,
}

impl Default for UsageLoggingConfig {
    fn default() -> Self {
        Self {
            log_on_resolve: true,
        }
    }
}

/// Action token configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for the built-in digest token verifier
    ///
    /// When unset, every token is rejected.
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Action name download tokens are issued for
    #[serde(default = "default_download_action")]
    pub download_action: String,

    /// Action name session tokens (log-download header) are issued for
    #[serde(default = "default_session_action")]
    pub session_action: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            download_action: default_download_action(),
            session_action: default_session_action(),
        }
    }
}

/// External identity service configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity service; `None` means unavailable
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request deadline (default: 10 seconds)
    #[serde(default = "default_identity_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: default_identity_timeout(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Key granting editor capability (download-stats), sent as X-Api-Key
    #[serde(default)]
    pub editor_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: false)
    #[serde(default)]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            editor_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: false,
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./dataset-dl.db")
}

fn default_archive_base_url() -> String {
    "https://legacy.pewresearch.org".to_string()
}

fn default_rest_prefix() -> String {
    "/wp-json".to_string()
}

fn default_route_base() -> String {
    "/wp/v2/dataset".to_string()
}

/// Legacy network site IDs and their path prefixes
fn default_site_paths() -> HashMap<i64, String> {
    [
        (2, "/global"),
        (3, "/social-trends"),
        (4, "/politics"),
        (5, "/hispanic"),
        (7, "/religion"),
        (8, "/journalism"),
        (9, "/internet"),
        (10, "/methods"),
        (16, "/science"),
        (18, "/race-ethnicity"),
        (19, "/decoded"),
    ]
    .into_iter()
    .map(|(id, path)| (id, path.to_string()))
    .collect()
}

fn default_media_field() -> String {
    "dataset_download_url".to_string()
}

fn default_archive_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./datasets")
}

fn default_public_base_url() -> String {
    "/datasets".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_stats_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_start_year() -> i32 {
    2020
}

fn default_download_action() -> String {
    "dataset_download".to_string()
}

fn default_session_action() -> String {
    "rest".to_string()
}

fn default_identity_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.stats.ttl, Duration::from_secs(86_400));
        assert_eq!(config.stats.start_year, 2020);
        assert_eq!(config.archive.media_field, "dataset_download_url");
        assert_eq!(config.archive.site_paths.get(&4).unwrap(), "/politics");
        assert!(config.archive.site_paths.get(&1).is_none());
        assert!(config.logging.log_on_resolve);
        assert!(config.auth.token_secret.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "archive": { "base_url": "http://archive.test", "timeout": 5 },
                "stats": { "ttl": 60 },
                "auth": { "token_secret": "s3cret" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.archive.base_url, "http://archive.test");
        assert_eq!(config.archive.timeout, Duration::from_secs(5));
        assert_eq!(config.archive.route_base, "/wp/v2/dataset");
        assert_eq!(config.archive.site_paths.len(), 11);
        assert_eq!(config.stats.ttl, Duration::from_secs(60));
        assert_eq!(config.stats.start_year, 2020);
        assert_eq!(config.auth.token_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.download_action, "dataset_download");
    }

    #[test]
    fn test_durations_roundtrip_as_seconds() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["stats"]["ttl"], 86_400);
        assert_eq!(json["recovery"]["retry"]["initial_delay"], 1);
    }
}
