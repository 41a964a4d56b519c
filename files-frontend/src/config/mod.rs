use secrecy::Secret;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub identity: IdentitySettings,
    pub discovery: DiscoverySettings,
    pub directory: DirectorySettings,
    pub broker: BrokerSettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Browser-facing base URL, used to build the OAuth redirect URI
    /// and the origin URLs a user is sent back to after consent.
    pub public_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP collector endpoint; spans stay local when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

#[derive(Deserialize, Clone)]
pub struct IdentitySettings {
    /// Identity provider authority, e.g. https://login.example.com/common.
    pub authority: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Path on this service that receives the provider callback.
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,
}

fn default_redirect_path() -> String {
    "/oauth/callback".to_string()
}

#[derive(Deserialize, Clone)]
pub struct DiscoverySettings {
    /// Resource identifier the discovery-scoped token is requested for.
    pub resource: String,
    /// Base URL of the capability discovery service.
    pub url: String,
}

#[derive(Deserialize, Clone)]
pub struct DirectorySettings {
    /// Resource identifier the directory-scoped token is requested for.
    pub resource: String,
    /// Base URL of the directory/profile service.
    pub url: String,
}

#[derive(Deserialize, Clone)]
pub struct BrokerSettings {
    /// Margin subtracted from token expiry to absorb clock skew.
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: i64,
    /// Lifetime of an outstanding CSRF state entry.
    #[serde(default = "default_state_ttl_seconds")]
    pub state_ttl_seconds: i64,
    /// How long a discovered capability binding stays trusted.
    #[serde(default = "default_binding_ttl_seconds")]
    pub binding_ttl_seconds: i64,
    /// Retry bound for transient identity-provider failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Wall-clock bound on one full resource chain.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Logical capability name resolved for the files listing.
    #[serde(default = "default_files_capability")]
    pub files_capability: String,
}

fn default_clock_skew_seconds() -> i64 {
    300
}

fn default_state_ttl_seconds() -> i64 {
    600
}

fn default_binding_ttl_seconds() -> i64 {
    86_400
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_files_capability() -> String {
    "files".to_string()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");

    // Check if we're already in files-frontend directory or need to navigate to it
    let configuration_directory = if base_path.ends_with("files-frontend") {
        base_path.join("config")
    } else {
        base_path.join("files-frontend").join("config")
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
