use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

// Default configuration values
const DEFAULT_API_URL: &str = "http://localhost";
const DEFAULT_API_PORT: u16 = 8000;
const DEFAULT_AUTH_PREFIX: &str = "auth";
const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 300;
const DEFAULT_REFRESH_RETRY_DELAY_MS: u64 = 250;

/// Main configuration struct for Tessera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote authentication API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Token refresh polling configuration
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Local session persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Remote authentication API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API (scheme and host, without port)
    #[serde(default = "default_api_url")]
    pub base_url: String,
    /// Port the API listens on
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Path prefix for the auth endpoints
    #[serde(default = "default_auth_prefix")]
    pub auth_prefix: String,
}

impl ApiConfig {
    /// Resolve the full base address for auth endpoints
    pub fn auth_base(&self) -> String {
        format!(
            "{}:{}/{}",
            self.base_url.trim_end_matches('/'),
            self.port,
            self.auth_prefix.trim_matches('/')
        )
    }
}

/// Token refresh polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Seconds between periodic refresh attempts; zero disables polling
    #[serde(default = "default_refresh_interval")]
    pub interval_seconds: u64,
    /// Delay in milliseconds before the single retry of a failed refresh
    #[serde(default = "default_refresh_retry_delay")]
    pub retry_delay_ms: u64,
}

/// Local session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory where session slices are written
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Default functions
fn default_api_url() -> String {
    std::env::var("TESSERA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

fn default_api_port() -> u16 {
    std::env::var("TESSERA_API_PORT")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_API_PORT)
}

fn default_auth_prefix() -> String {
    std::env::var("TESSERA_AUTH_PREFIX").unwrap_or_else(|_| DEFAULT_AUTH_PREFIX.to_string())
}

fn default_refresh_interval() -> u64 {
    std::env::var("TESSERA_REFRESH_INTERVAL_SECS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECONDS)
}

fn default_refresh_retry_delay() -> u64 {
    std::env::var("TESSERA_REFRESH_RETRY_DELAY_MS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REFRESH_RETRY_DELAY_MS)
}

fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TESSERA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(user_config_dir) = dirs_next::config_dir() {
        return user_config_dir.join("tessera");
    }

    // Fallback to current directory
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            refresh: RefreshConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            port: default_api_port(),
            auth_prefix: default_auth_prefix(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_refresh_interval(),
            retry_delay_ms: default_refresh_retry_delay(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Manages configuration for the application
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub async fn new() -> Result<Self> {
        // Determine configuration path
        let config_path = get_config_path()?;
        let config = load_or_create_config(&config_path).await?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a clone of the current configuration
    pub async fn get_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Update the configuration
    pub async fn update_config(&self, new_config: Config) -> Result<()> {
        // Update in memory
        *self.config.write().await = new_config.clone();

        // Save to disk
        save_config(&self.config_path, &new_config).await?;

        Ok(())
    }
}

/// Load the application configuration
pub async fn load_config() -> Result<Config> {
    let config_manager = ConfigManager::new().await?;
    Ok(config_manager.get_config().await)
}

/// Get the path to the configuration file
fn get_config_path() -> Result<PathBuf> {
    // Check for explicit config path from environment
    if let Ok(path) = std::env::var("TESSERA_CONFIG_PATH") {
        return Ok(PathBuf::from(path));
    }

    // Use the user's config directory when available
    if let Some(user_config_dir) = dirs_next::config_dir() {
        let config_dir = user_config_dir.join("tessera");
        std::fs::create_dir_all(&config_dir)?;
        return Ok(config_dir.join("config.json"));
    }

    // Fallback to current directory
    Ok(PathBuf::from("config.json"))
}

/// Load configuration from file or create default
async fn load_or_create_config(path: &Path) -> Result<Config> {
    // Check if file exists
    if !path.exists() {
        // Create default config
        let default_config = Config::default();
        save_config(path, &default_config).await?;
        info!("Created default configuration at {}", path.display());
        return Ok(default_config);
    }

    // Load existing config
    let config_str = fs::read_to_string(path).await?;
    let config: Config = serde_json::from_str(&config_str)?;
    debug!("Loaded configuration from {}", path.display());

    Ok(config)
}

/// Save configuration to file
async fn save_config(path: &Path, config: &Config) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    // Serialize and write
    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str).await?;
    debug!("Saved configuration to {}", path.display());

    Ok(())
}
