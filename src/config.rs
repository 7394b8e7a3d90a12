use repodoc_core::sync::DEFAULT_CONCURRENCY;
use repodoc_core::tombstone::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Base URL of the contents store
    pub store_url: ConfigValue<String>,
    /// Bearer token for the store
    #[serde(serialize_with = "serialize_masked")]
    pub token: ConfigValue<Option<String>>,
    /// Local file holding the pending-deletion set
    pub state_path: ConfigValue<PathBuf>,
    /// Concurrent member fetches per collection listing
    pub fetch_concurrency: ConfigValue<usize>,
    /// Namespace holding deletion markers
    pub tombstone_namespace: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    store_url: Option<String>,
    token: Option<String>,
    state_path: Option<PathBuf>,
    fetch_concurrency: Option<usize>,
    tombstone_namespace: Option<String>,
}

pub const DEFAULT_STORE_URL: &str = "http://localhost:8080";

/// Masks all but the last four characters of a token.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn serialize_masked<S: Serializer>(
    token: &ConfigValue<Option<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    ConfigValue::new(token.value.as_deref().map(mask_token), token.source.clone())
        .serialize(serializer)
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut store_url = ConfigValue::new(DEFAULT_STORE_URL.to_string(), ConfigSource::Default);
        let mut token = ConfigValue::new(None, ConfigSource::Default);
        let mut state_path = ConfigValue::new(
            Self::default_data_dir().join("pending_deletions.json"),
            ConfigSource::Default,
        );
        let mut fetch_concurrency = ConfigValue::new(DEFAULT_CONCURRENCY, ConfigSource::Default);
        let mut tombstone_namespace =
            ConfigValue::new(DEFAULT_NAMESPACE.to_string(), ConfigSource::Default);
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.store_url {
                store_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(value) = file_config.token {
                token = ConfigValue::new(Some(value), ConfigSource::File);
            }
            if let Some(state) = file_config.state_path {
                state_path = ConfigValue::new(resolve_relative(&path, state), ConfigSource::File);
            }
            if let Some(n) = file_config.fetch_concurrency {
                fetch_concurrency = ConfigValue::new(n, ConfigSource::File);
            }
            if let Some(namespace) = file_config.tombstone_namespace {
                tombstone_namespace = ConfigValue::new(namespace, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        if let Ok(url) = std::env::var("REPODOC_URL") {
            store_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(value) = std::env::var("REPODOC_TOKEN") {
            token = ConfigValue::new(Some(value), ConfigSource::Environment);
        }
        if let Ok(state) = std::env::var("REPODOC_STATE_PATH") {
            state_path = ConfigValue::new(PathBuf::from(state), ConfigSource::Environment);
        }
        if let Ok(n) = std::env::var("REPODOC_CONCURRENCY") {
            let parsed = n
                .parse()
                .map_err(|_| ConfigError::InvalidValue("REPODOC_CONCURRENCY".to_string(), n))?;
            fetch_concurrency = ConfigValue::new(parsed, ConfigSource::Environment);
        }

        Ok(Self {
            store_url,
            token,
            state_path,
            fetch_concurrency,
            tombstone_namespace,
            config_file,
        })
    }

    /// Returns the token, or an error telling the user how to set one.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.value.as_deref().ok_or(ConfigError::MissingToken)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/repodoc/
    /// - macOS: ~/Library/Application Support/repodoc/
    /// - Windows: %APPDATA%/repodoc/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repodoc")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/repodoc/
    /// - macOS: ~/Library/Application Support/repodoc/
    /// - Windows: %APPDATA%/repodoc/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repodoc")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolves relative paths against the config file's directory
fn resolve_relative(config_path: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&path))
            .unwrap_or(path)
    } else {
        path
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
    MissingToken,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
            ConfigError::MissingToken => {
                write!(
                    f,
                    "No store token configured. Set 'token' in the config file or REPODOC_TOKEN."
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}
