use std::path::{Path, PathBuf};

use reqwest::Url;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::secrets::has_secret_source;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Returns `~/.campaign-assist/config.json`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".campaign-assist").join("config.json"))
        .ok_or(ConfigError::NoConfigPath)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let base_url = Url::parse(&config.service.base_url).map_err(|e| ConfigError::Validation {
        message: format!("Invalid service baseUrl '{}': {}", config.service.base_url, e),
    })?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            message: format!(
                "Service baseUrl must use http or https, got '{}'",
                base_url.scheme()
            ),
        });
    }
    if base_url.cannot_be_a_base() {
        return Err(ConfigError::Validation {
            message: format!("Service baseUrl '{}' cannot be a base", base_url),
        });
    }

    let service = &config.service;
    if !has_secret_source(
        service.credential.as_deref(),
        service.credential_file.as_deref(),
        service.credential_env_var.as_deref(),
    ) {
        return Err(ConfigError::Validation {
            message: "Service needs one of credential, credentialFile or credentialEnvVar"
                .to_string(),
        });
    }

    if config.polling.interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "polling.intervalMs must be greater than zero".to_string(),
        });
    }
    if config.polling.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "polling.maxAttempts must be greater than zero".to_string(),
        });
    }

    Ok(())
}
