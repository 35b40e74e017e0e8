//! Credential resolution for external collaborators.
//!
//! Every credential the reconciler needs (forum API key, document-service
//! token, GitHub token) can be supplied three ways, checked in this order:
//!
//! 1. **Direct value** - e.g. `DISCOURSE_KEY=...`
//! 2. **File reference** - e.g. `DISCOURSE_KEY_FILE=/run/secrets/discourse`
//! 3. **Env var reference** - the name of another variable holding the value

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided for {what}")]
    NoSourceProvided { what: String },

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{path}' is empty")]
    EmptyFile { path: String },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// The places a single credential may come from.
#[derive(Debug, Clone, Default)]
pub struct SecretSource {
    /// Human-readable name used in error messages.
    pub what: String,
    pub direct: Option<String>,
    pub file: Option<String>,
    pub env_var: Option<String>,
}

impl SecretSource {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            ..Default::default()
        }
    }

    pub fn direct(mut self, value: Option<String>) -> Self {
        self.direct = value;
        self
    }

    pub fn file(mut self, path: Option<String>) -> Self {
        self.file = path;
        self
    }

    pub fn env_var(mut self, name: Option<String>) -> Self {
        self.env_var = name;
        self
    }

    /// Returns true if at least one non-empty source is configured.
    pub fn is_configured(&self) -> bool {
        [&self.direct, &self.file, &self.env_var]
            .iter()
            .any(|s| s.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// Resolves the secret, failing when no source yields a value.
    pub fn resolve(&self) -> Result<SecretString> {
        if let Some(value) = non_empty(&self.direct) {
            return Ok(SecretString::from(value.trim().to_string()));
        }

        if let Some(path) = non_empty(&self.file) {
            let expanded = expand_home(path);
            let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
                path: expanded.clone(),
                source: e,
            })?;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(SecretError::EmptyFile { path: expanded });
            }
            return Ok(SecretString::from(trimmed.to_string()));
        }

        if let Some(var_name) = non_empty(&self.env_var) {
            return match std::env::var(var_name) {
                Ok(value) => Ok(SecretString::from(value.trim().to_string())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: var_name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: var_name.to_string(),
                }),
            };
        }

        Err(SecretError::NoSourceProvided {
            what: self.what.clone(),
        })
    }

    /// Resolves the secret, returning `None` when nothing is configured.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
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
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_direct_value_takes_priority() {
        std::env::set_var("RR_TEST_SECRET_1", "env_value");
        let secret = SecretSource::new("forum key")
            .direct(Some("direct_value".into()))
            .env_var(Some("RR_TEST_SECRET_1".into()))
            .resolve()
            .unwrap();
        assert_eq!(secret.expose_secret(), "direct_value");
        std::env::remove_var("RR_TEST_SECRET_1");
    }

    #[test]
    fn test_file_is_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  file_value  ").unwrap();
        let secret = SecretSource::new("token")
            .file(Some(file.path().to_string_lossy().into_owned()))
            .resolve()
            .unwrap();
        assert_eq!(secret.expose_secret(), "file_value");
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let result = SecretSource::new("token")
            .file(Some(file.path().to_string_lossy().into_owned()))
            .resolve();
        assert!(matches!(result, Err(SecretError::EmptyFile { .. })));
    }

    #[test]
    #[serial]
    fn test_env_var_fallback_and_missing() {
        std::env::set_var("RR_TEST_SECRET_2", "from_env");
        let source = SecretSource::new("token").env_var(Some("RR_TEST_SECRET_2".into()));
        assert_eq!(source.resolve().unwrap().expose_secret(), "from_env");
        std::env::remove_var("RR_TEST_SECRET_2");
        assert!(matches!(source.resolve(), Err(SecretError::EnvVarNotSet { .. })));
    }

    #[test]
    fn test_optional_returns_none_without_sources() {
        let source = SecretSource::new("token").direct(Some(String::new()));
        assert!(!source.is_configured());
        assert!(source.resolve_optional().unwrap().is_none());
    }

    #[test]
    fn test_missing_file_errors() {
        let result = SecretSource::new("token")
            .file(Some("/nonexistent/path/to/secret".into()))
            .resolve_optional();
        assert!(matches!(result, Err(SecretError::FileReadError { .. })));
    }
}
