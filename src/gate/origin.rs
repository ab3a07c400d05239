//! `Origin` header validation for the agent upgrade and CORS.

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Accepts an absent origin or one with the extension scheme and a host.
///
/// # Errors
///
/// Returns [`Error::Forbidden`] for any other origin.
pub fn validate_origin(origin: Option<&str>, scheme: &str) -> Result<()> {
    let Some(origin) = origin else {
        return Ok(());
    };

    if origin_allowed(origin, scheme) {
        Ok(())
    } else {
        debug!(origin, "Rejected origin");
        Err(Error::forbidden(origin))
    }
}

/// Returns `true` if `origin` uses `scheme` and names a host.
#[must_use]
pub fn origin_allowed(origin: &str, scheme: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => url.scheme() == scheme && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}
