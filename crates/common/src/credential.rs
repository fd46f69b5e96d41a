//! Hub access token.
//!
//! The token is read from the process environment. A `.env` file may seed the
//! environment first; variables that are already set are never overridden.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};

/// Default name of the environment variable holding the token.
pub const TOKEN_ENV_VAR: &str = "HUGGINGFACE_API_TOKEN";

/// Opaque bearer token for the model hub. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Seed the environment from a `.env` file.
///
/// With `path = None` the usual lookup applies (current directory, then
/// parents). A missing file is fine; a malformed one is logged and skipped.
/// Returns the file that was applied, if any.
pub fn load_dotenv(path: Option<&Path>) -> Option<PathBuf> {
    let loaded = match path {
        Some(p) => dotenvy::from_path(p).map(|()| p.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(p) => {
            tracing::debug!(path = %p.display(), "loaded .env");
            Some(p)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!("ignoring .env: {e}");
            None
        }
    }
}

/// Look up `var` through `lookup`. Missing and empty values are both fatal.
pub fn read_credential<F>(var: &str, lookup: F) -> Result<Credential>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(token) if !token.is_empty() => Ok(Credential(token)),
        _ => Err(ChatError::MissingCredential {
            var: var.to_string(),
        }),
    }
}

/// [`read_credential`] against the real process environment.
pub fn credential_from_env(var: &str) -> Result<Credential> {
    read_credential(var, |k| std::env::var(k).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_or_empty_is_fatal() {
        let err = read_credential(TOKEN_ENV_VAR, |_| None).unwrap_err();
        assert!(matches!(err, ChatError::MissingCredential { ref var } if var == TOKEN_ENV_VAR));

        let err = read_credential(TOKEN_ENV_VAR, |_| Some(String::new())).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn value_is_returned_unchanged() {
        let cred = read_credential("TOK", |k| {
            assert_eq!(k, "TOK");
            Some("  hf_abc ".to_string())
        })
        .unwrap();
        assert_eq!(cred.expose(), "  hf_abc ");
    }

    #[test]
    fn debug_is_redacted() {
        let cred = Credential::new("hf_secret");
        assert!(!format!("{cred:?}").contains("hf_secret"));
    }

    #[test]
    fn dotenv_file_seeds_environment() {
        let var = "HFCHAT_TEST_DOTENV_TOKEN";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{var}=hf_from_file").unwrap();

        let applied = load_dotenv(Some(file.path()));
        assert_eq!(applied.as_deref(), Some(file.path()));
        assert_eq!(credential_from_env(var).unwrap().expose(), "hf_from_file");
    }

    #[test]
    fn missing_dotenv_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dotenv(Some(&dir.path().join("absent.env"))).is_none());
    }
}
