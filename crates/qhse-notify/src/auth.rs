//! Bearer token lookup.
//!
//! The web front end keeps its JWT in local storage under a fixed key, often
//! JSON-encoded (so wrapped in double quotes) and sometimes holding the
//! stringified `null`/`undefined` left behind by a logout. `LocalStorageFile`
//! mirrors that storage with a JSON object on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reqwest::header::HeaderValue;
use tracing::debug;

/// Key under which the token is stored.
pub const TOKEN_STORAGE_KEY: &str = "token";

/// Source of the raw stored token.
pub trait TokenSource: Send + Sync {
    /// The raw stored value, exactly as persisted.
    fn stored_token(&self) -> Option<String>;
}

/// In-memory token.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenSource for StaticToken {
    fn stored_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// JSON key/value file standing in for browser local storage.
///
/// The file is re-read on every lookup so a login from another process is
/// picked up by the next request.
#[derive(Debug, Clone)]
pub struct LocalStorageFile {
    path: PathBuf,
}

impl LocalStorageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Option<HashMap<String, serde_json::Value>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Local storage file not readable");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(entries) => Some(entries),
            Err(e) => {
                debug!(
                    path = %self.path.display(),
                    error = %e,
                    "Local storage file is not a JSON object"
                );
                None
            }
        }
    }
}

impl TokenSource for LocalStorageFile {
    fn stored_token(&self) -> Option<String> {
        let entries = self.read_entries()?;
        match entries.get(TOKEN_STORAGE_KEY)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Normalize a raw stored token.
///
/// Returns `None` for the literal strings `null` and `undefined` and for
/// values that are empty once the wrapping double quotes are stripped.
pub fn normalize_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed == "null" || trimmed == "undefined" {
        return None;
    }

    let token = trimmed.trim_matches('"');
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Build the `Authorization` header value for the stored token, if any.
pub fn bearer_header(source: &dyn TokenSource) -> Option<HeaderValue> {
    let token = normalize_token(&source.stored_token()?)?;
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            Some(value)
        }
        Err(e) => {
            debug!(error = %e, "Stored token is not a valid header value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("abc.def"), Some("abc.def".to_string()));
        assert_eq!(normalize_token("\"abc.def\""), Some("abc.def".to_string()));
        assert_eq!(normalize_token("null"), None);
        assert_eq!(normalize_token("undefined"), None);
        assert_eq!(normalize_token("\"\""), None);
        assert_eq!(normalize_token(""), None);
    }

    #[test]
    fn test_bearer_header_strips_quotes() {
        let header = bearer_header(&StaticToken::new("\"jwt-token\"")).unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer jwt-token");
        assert!(header.is_sensitive());
    }

    #[test]
    fn test_bearer_header_absent() {
        assert!(bearer_header(&StaticToken::none()).is_none());
        assert!(bearer_header(&StaticToken::new("undefined")).is_none());
    }

    #[test]
    fn test_local_storage_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"token": "\"stored-jwt\"", "theme": "dark"}}"#).unwrap();

        let storage = LocalStorageFile::new(file.path());
        assert_eq!(storage.stored_token(), Some("\"stored-jwt\"".to_string()));
        assert_eq!(
            bearer_header(&storage).unwrap().to_str().unwrap(),
            "Bearer stored-jwt"
        );
    }

    #[test]
    fn test_local_storage_missing_or_invalid() {
        let storage = LocalStorageFile::new("/nonexistent/qhse/storage.json");
        assert!(storage.stored_token().is_none());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(LocalStorageFile::new(file.path()).stored_token().is_none());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"token": null}}"#).unwrap();
        assert!(LocalStorageFile::new(file.path()).stored_token().is_none());
    }
}
