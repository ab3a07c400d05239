//! Shared-secret authentication.
//!
//! Clients present the token as `Authorization: Bearer <token>` or as a
//! `token` query parameter. Comparison is constant-time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use tracing::{debug, info};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Directory under the home directory holding relay state.
pub const STATE_DIR: &str = ".bridgemcp";

/// File name of the persisted token.
pub const TOKEN_FILE: &str = "token";

/// Query parameter carrying the token.
pub const TOKEN_PARAM: &str = "token";

const BEARER_PREFIX: &str = "Bearer ";

// ============================================================================
// AuthToken
// ============================================================================

/// The relay's shared secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

impl AuthToken {
    /// Generates a token from 256 bits of randomness.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wraps an operator-supplied token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the token is empty or contains whitespace.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(Error::config("token must be non-empty without whitespace"));
        }
        Ok(Self(token))
    }

    /// Returns the token text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares a presented credential in constant time.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        secure_eq(presented, &self.0)
    }

    /// Checks a request's credentials.
    ///
    /// `authorization` is the raw `Authorization` header, `query` the raw
    /// query string.
    #[must_use]
    pub fn verify(&self, authorization: Option<&str>, query: Option<&str>) -> bool {
        let from_header = authorization
            .and_then(|h| h.strip_prefix(BEARER_PREFIX))
            .is_some_and(|t| self.matches(t.trim()));

        from_header || token_from_query(query).is_some_and(|t| self.matches(&t))
    }
}

// ============================================================================
// Persistence
// ============================================================================

impl AuthToken {
    /// Default token path, `~/.bridgemcp/token`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(STATE_DIR).join(TOKEN_FILE))
    }

    /// Reads a token file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or
    /// [`Error::Config`] if its contents are not a valid token.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::new(text.trim())
    }

    /// Writes the token so that only the current user can read it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory or file cannot be written.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            create_private_dir(dir)?;
        }

        let mut file = open_private_file(path)?;
        file.write_all(self.0.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        info!(path = %path.display(), "Token written");
        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(unix)]
fn open_private_file(path: &Path) -> Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private_file(path: &Path) -> Result<fs::File> {
    Ok(fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

// ============================================================================
// Helpers
// ============================================================================

/// Constant-time string comparison.
fn secure_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (&x, &y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extracts and decodes the `token` query parameter.
fn token_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == TOKEN_PARAM {
            return match urlencoding::decode(value) {
                Ok(decoded) => Some(decoded.into_owned()),
                Err(e) => {
                    debug!(error = %e, "Undecodable token parameter");
                    None
                }
            };
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_carries_full_key() {
        let token = AuthToken::generate();
        let bytes = URL_SAFE_NO_PAD.decode(token.as_str()).expect("base64");
        assert_eq!(bytes.len(), 32);

        // no fixed version nibble
        let nibbles: std::collections::HashSet<u8> = (0..64)
            .map(|_| {
                let bytes = URL_SAFE_NO_PAD.decode(AuthToken::generate().as_str()).expect("base64");
                bytes[6] >> 4
            })
            .collect();
        assert!(nibbles.len() > 1);
    }

    #[test]
    fn test_generated_tokens_are_url_safe_and_distinct() {
        let a = AuthToken::generate();
        let b = AuthToken::generate();

        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 43);
        assert!(
            a.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let token = AuthToken::new("hunter2").expect("token");
        assert!(!format!("{token:?}").contains("hunter2"));
    }

    #[test]
    fn test_new_rejects_blank() {
        assert!(AuthToken::new("").is_err());
        assert!(AuthToken::new("a b").is_err());
    }

    #[test]
    fn test_verify_bearer_header() {
        let token = AuthToken::new("s3cret").expect("token");
        assert!(token.verify(Some("Bearer s3cret"), None));
        assert!(!token.verify(Some("Bearer wrong"), None));
        assert!(!token.verify(Some("Basic s3cret"), None));
        assert!(!token.verify(None, None));
    }

    #[test]
    fn test_verify_query_parameter() {
        let token = AuthToken::new("a+b/c").expect("token");
        assert!(token.verify(None, Some("tabId=3&token=a%2Bb%2Fc")));
        assert!(!token.verify(None, Some("tabId=3&token=nope")));
        assert!(!token.verify(None, Some("tokens=a%2Bb%2Fc")));
    }

    #[test]
    fn test_secure_eq() {
        assert!(secure_eq("abc", "abc"));
        assert!(!secure_eq("abc", "abd"));
        assert!(!secure_eq("abc", "abcd"));
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(STATE_DIR).join(TOKEN_FILE);
        let token = AuthToken::generate();

        token.persist(&path).expect("persist");
        let loaded = AuthToken::load(&path).expect("load");
        assert_eq!(loaded, token);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let file_mode = fs::metadata(&path).expect("meta").permissions().mode();
            let dir_mode = fs::metadata(path.parent().expect("parent"))
                .expect("meta")
                .permissions()
                .mode();
            assert_eq!(file_mode & 0o777, 0o600);
            assert_eq!(dir_mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_persist_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(TOKEN_FILE);

        AuthToken::new("first-token-value").expect("token").persist(&path).expect("persist");
        AuthToken::new("second").expect("token").persist(&path).expect("persist");

        assert_eq!(AuthToken::load(&path).expect("load").as_str(), "second");
    }
}
