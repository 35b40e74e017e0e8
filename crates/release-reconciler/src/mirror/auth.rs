//! HTTPS token authentication for git subprocesses.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use super::error::{MirrorError, Result};

/// Escapes a token for safe use in single-quoted shell strings.
pub fn shell_escape_token(token: &str) -> String {
    token.replace('\'', "'\\''")
}

/// Deletes the askpass script when dropped so tokens do not linger on disk.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Environment for one git invocation. Keep it alive until the command exits.
#[derive(Debug)]
pub struct AuthEnv {
    pub env_vars: Vec<(String, String)>,
    pub _cleanup: AskpassCleanup,
}

impl AuthEnv {
    fn none() -> Self {
        Self {
            env_vars: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
            _cleanup: AskpassCleanup::empty(),
        }
    }
}

/// Builds the askpass environment for a token, or a prompt-free environment without one.
///
/// The script answers the username prompt with `oauth2` and the password
/// prompt with the token, which is what GitHub expects for token auth.
pub fn build_auth_env(token: Option<&SecretString>) -> Result<AuthEnv> {
    let Some(token) = token else {
        return Ok(AuthEnv::none());
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        let escaped = shell_escape_token(token.expose_secret());
        let path = std::env::temp_dir().join(format!(
            ".reconciler-askpass-{}.sh",
            uuid::Uuid::new_v4()
        ));
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  Username*) echo 'oauth2' ;;\n  *) echo '{}' ;;\nesac\n",
            escaped
        );

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(&path)?;
        std::io::Write::write_all(&mut file, script.as_bytes())?;
        drop(file);

        let cleanup = AskpassCleanup::new(path.clone());
        let path_str = path
            .to_str()
            .ok_or_else(|| {
                MirrorError::GitAuthFailed(
                    "Temp directory path contains non-UTF8 characters".to_string(),
                )
            })?
            .to_string();

        Ok(AuthEnv {
            env_vars: vec![
                ("GIT_ASKPASS".to_string(), path_str),
                ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
            ],
            _cleanup: cleanup,
        })
    }

    #[cfg(not(unix))]
    {
        let _ = token.expose_secret();
        Err(MirrorError::GitAuthFailed(
            "Token authentication requires a unix askpass helper".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_token_disables_prompts() {
        let env = build_auth_env(None).unwrap();
        assert_eq!(
            env.env_vars,
            vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]
        );
    }

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape_token("a'b"), "a'\\''b");
    }

    #[cfg(unix)]
    #[test]
    fn test_askpass_script_is_removed_on_drop() {
        let token = SecretString::from("s3cr'et".to_string());
        let env = build_auth_env(Some(&token)).unwrap();
        let path = env
            .env_vars
            .iter()
            .find(|(k, _)| k == "GIT_ASKPASS")
            .map(|(_, v)| PathBuf::from(v))
            .unwrap();
        let script = std::fs::read_to_string(&path).unwrap();
        assert!(script.contains("oauth2"));
        assert!(script.contains("s3cr'\\''et"));
        drop(env);
        assert!(!path.exists());
    }
}
