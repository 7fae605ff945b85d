mod loader;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use loader::load_config;

/// Searched in order when no config path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["config.yaml", "config.yml", "./config/config.yaml"];

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay server listen configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Upstream LM Studio server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Full backend URL (e.g., "http://192.168.1.21:9001")
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Connect/read timeout for completion requests, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Timeout for the model listing request, in seconds
    #[serde(default = "default_models_timeout")]
    pub models_timeout_seconds: u64,
    /// TLS configuration options
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,
}

/// TLS configuration for backend connections
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Accept invalid certificates (self-signed, expired)
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Path to custom CA certificate (PEM format)
    pub ca_cert_path: Option<String>,
    /// Path to client certificate for mTLS
    pub client_cert_path: Option<String>,
    /// Path to client private key for mTLS
    pub client_key_path: Option<String>,
}

fn default_backend_url() -> String {
    "http://localhost:1234".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_models_timeout() -> u64 {
    5
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_seconds: default_timeout(),
            models_timeout_seconds: default_models_timeout(),
            tls: None,
            api_key: None,
        }
    }
}

impl BackendConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns true if the URL uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.url.to_lowercase().starts_with("https://")
    }
}

/// Sampling parameters sent with every completion request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// `-1` lets the server generate until the model stops
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> i64 {
    -1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Model listing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    /// Known-good models, always listed and served when the backend is unreachable
    #[serde(default = "default_fallback_models")]
    pub fallback: Vec<String>,
}

fn default_fallback_models() -> Vec<String> {
    [
        "bartowski/stable-code-instruct-3b-GGUF/stable-code-instruct-3b-Q4_0.gguf",
        "lmstudio-community/Meta-Llama-3.1-8B-Instruct-GGUF/Meta-Llama-3.1-8B-Instruct-Q4_K_M.gguf",
        "second-state/Llava-v1.5-7B-GGUF/llava-v1.5-7b-Q4_0.gguf",
        "internlm/internlm2_5-20b-chat-gguf/internlm2_5-20b-chat-q4_0.gguf",
        "lmstudio-community/Codestral-22B-v0.1-GGUF/Codestral-22B-v0.1-Q4_K_M.gguf",
        "TheBloke/WizardCoder-Python-34B-V1.0-GGUF/wizardcoder-python-34b-v1.0.Q3_K_S.gguf",
        "TheBloke/WizardCoder-33B-V1.1-GGUF/wizardcoder-33b-v1.1.Q3_K_S.gguf",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback_models(),
        }
    }
}

/// What to do when `/generate` reuses a session id that is still streaming
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Replace the registry entry; the earlier relay keeps running unstoppable
    #[default]
    Overwrite,
    /// Fail the new relay and leave the running one alone
    Reject,
}

/// Relay session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub on_collision: CollisionPolicy,
    /// Number of SSE events buffered between a relay task and its response body
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    32
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            on_collision: CollisionPolicy::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Conversation history configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_history_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    100
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_history_enabled(),
            max_entries: default_max_entries(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// First existing config file: `config_path` if given, else the default locations
    pub fn find_file(config_path: Option<&Path>) -> Option<PathBuf> {
        match config_path {
            Some(path) => path.exists().then(|| path.to_path_buf()),
            None => DEFAULT_CONFIG_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists()),
        }
    }

    /// Load configuration, falling back to built-in defaults when no file exists
    ///
    /// The fallback only applies to the default locations; an explicit
    /// `config_path` must exist.
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::from_file(path);
        }
        match Self::find_file(None) {
            Some(path) => Self::from_file(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Check values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.backend.url).map_err(|e| {
            ConfigError::Validation(format!("invalid backend url '{}': {}", self.backend.url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "backend url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if self.backend.timeout_seconds == 0 || self.backend.models_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "backend timeouts must be greater than zero".to_string(),
            ));
        }
        if self.sessions.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "sessions.channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.history.enabled && self.history.max_entries == 0 {
            return Err(ConfigError::Validation(
                "history.max_entries must be greater than zero when history is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
