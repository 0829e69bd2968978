//! Resolution of the analysis service credential.
//!
//! The credential can come from three places, checked in order:
//!
//! 1. **Direct value** - `"credential": "..."` in the config file, for local testing
//! 2. **File reference** - `"credentialFile": "/run/secrets/analysis-key"`
//! 3. **Env var reference** - `"credentialEnvVar": "ANALYSIS_API_KEY"`

use secrecy::SecretString;
use std::fs;

use crate::config::ServiceConfig;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No credential source provided (need one of: credential, credentialFile, credentialEnvVar)")]
    NoSourceProvided,

    #[error("Failed to read credential from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Credential from {origin} is empty")]
    Empty { origin: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves the service credential configured in `service`.
pub fn resolve_credential(service: &ServiceConfig) -> Result<SecretString> {
    resolve_secret(
        service.credential.as_deref(),
        service.credential_file.as_deref(),
        service.credential_env_var.as_deref(),
    )
}

/// Resolves a secret from a direct value, a file, or an environment variable.
///
/// Empty source names are skipped. File contents and env values are trimmed,
/// and a source that resolves to an empty string is an error rather than a
/// silent fallthrough to the next source.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        return non_empty(content.trim(), format!("file '{}'", expanded));
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => non_empty(value.trim(), format!("environment variable '{}'", name)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Checks whether at least one credential source is configured.
pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    [direct, file_path, env_var]
        .iter()
        .any(|s| s.is_some_and(|s| !s.is_empty()))
}

fn non_empty(value: &str, origin: String) -> Result<SecretString> {
    if value.is_empty() {
        return Err(SecretError::Empty { origin });
    }
    Ok(SecretString::from(value.to_string()))
}

/// Expands a leading `~` or `~/` to the current user's home directory.
pub(crate) fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_direct_value_wins() {
        let secret = resolve_secret(Some("direct"), Some("/nonexistent"), Some("UNUSED")).unwrap();
        assert_eq!(secret.expose_secret(), "direct");
    }

    #[test]
    fn test_file_value_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  from-file  ").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let secret = resolve_secret(None, Some(&path), None).unwrap();
        assert_eq!(secret.expose_secret(), "from-file");
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = resolve_secret(None, Some("/definitely/not/here"), None).unwrap_err();
        assert!(matches!(err, SecretError::FileReadError { .. }));
    }

    #[test]
    fn test_empty_file_is_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();
        let err = resolve_secret(None, Some(&path), None).unwrap_err();
        assert!(matches!(err, SecretError::Empty { .. }));
    }

    #[test]
    #[serial]
    fn test_env_var_source() {
        std::env::set_var("CAMPAIGN_ASSIST_TEST_KEY", "env-secret\n");
        let secret = resolve_secret(None, None, Some("CAMPAIGN_ASSIST_TEST_KEY")).unwrap();
        assert_eq!(secret.expose_secret(), "env-secret");
        std::env::remove_var("CAMPAIGN_ASSIST_TEST_KEY");
    }

    #[test]
    #[serial]
    fn test_env_var_not_set() {
        std::env::remove_var("CAMPAIGN_ASSIST_MISSING_KEY");
        let err = resolve_secret(None, None, Some("CAMPAIGN_ASSIST_MISSING_KEY")).unwrap_err();
        assert!(matches!(err, SecretError::EnvVarNotSet { .. }));
    }

    #[test]
    fn test_no_source() {
        assert!(matches!(
            resolve_secret(None, Some(""), None),
            Err(SecretError::NoSourceProvided)
        ));
        assert!(!has_secret_source(None, Some(""), None));
        assert!(has_secret_source(None, None, Some("KEY")));
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/etc/key"), "/etc/key");
        assert_eq!(expand_home("~alice/key"), "~alice/key");
    }
}
