use std::path::Path;

use super::{AppConfig, ConfigError};

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&content)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionPolicy;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), content).unwrap();
        file
    }

    #[test]
    fn test_load_missing_config() {
        let result = load_config("/nonexistent/config.yaml");
        assert!(matches!(result.unwrap_err(), ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_config_invalid_yaml() {
        let file = write_temp("invalid: yaml: content: [");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_valid() {
        let file = write_temp(
            r#"
server:
  port: 8066
  host: "127.0.0.1"

backend:
  url: "http://192.168.1.21:9001"
  timeout_seconds: 60
  api_key: "sk-local"

generation:
  temperature: 0.2
  max_tokens: 512

models:
  fallback:
    - "model-a"
    - "model-b"

sessions:
  on_collision: reject
  channel_capacity: 8

history:
  enabled: false
  max_entries: 10

logging:
  format: json
"#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 8066);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.backend.base_url(), "http://192.168.1.21:9001");
        assert_eq!(config.backend.timeout_seconds, 60);
        assert_eq!(config.backend.models_timeout_seconds, 5);
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-local"));
        assert_eq!(config.generation.max_tokens, 512);
        assert_eq!(config.models.fallback, vec!["model-a", "model-b"]);
        assert_eq!(config.sessions.on_collision, CollisionPolicy::Reject);
        assert_eq!(config.sessions.channel_capacity, 8);
        assert!(!config.history.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_minimal() {
        let file = write_temp("backend:\n  url: \"http://lmstudio:1234\"\n");

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.backend.url, "http://lmstudio:1234");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.models.fallback.len(), 7);
    }

    #[test]
    fn test_config_from_file_validates() {
        let file = write_temp("backend:\n  url: \"lmstudio\"\n");
        let result = AppConfig::from_file(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }
}
