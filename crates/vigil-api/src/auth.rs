use std::sync::Arc;

use arc_swap::ArcSwapOption;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Shared, swappable bearer credential.
///
/// One cell is shared by the HTTP client, the push stream, and the
/// session layer. Reads are lock-free; login, token refresh and logout
/// swap the whole value so every reader sees either the old or the new
/// token, never a mix.
#[derive(Debug, Default)]
pub struct TokenCell {
    token: ArcSwapOption<SecretString>,
}

impl TokenCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cell that already holds a token.
    pub fn with_token(token: SecretString) -> Self {
        let cell = Self::new();
        cell.set(token);
        cell
    }

    pub fn set(&self, token: SecretString) {
        self.token.store(Some(Arc::new(token)));
    }

    pub fn clear(&self) {
        self.token.store(None);
    }

    /// The current token, if any.
    pub fn current(&self) -> Option<Arc<SecretString>> {
        self.token.load_full()
    }

    pub fn is_present(&self) -> bool {
        self.token.load().is_some()
    }

    /// Build an `Authorization: Bearer …` header value from the current token.
    pub fn bearer_header(&self) -> Result<HeaderValue, Error> {
        let token = self.current().ok_or(Error::MissingCredential)?;
        bearer_value(&token)
    }
}

/// Format a bearer header value, marked sensitive so it never shows up
/// in debug output.
pub fn bearer_value(token: &SecretString) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())).map_err(
        |e| Error::Authentication {
            message: format!("invalid token header value: {e}"),
        },
    )?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_has_no_header() {
        let cell = TokenCell::new();
        assert!(!cell.is_present());
        assert!(matches!(cell.bearer_header(), Err(Error::MissingCredential)));
    }

    #[test]
    fn set_then_clear() {
        let cell = TokenCell::with_token(SecretString::from("abc"));
        assert!(cell.is_present());
        let header = cell.bearer_header().unwrap();
        assert!(header.is_sensitive());
        assert_eq!(header.to_str().unwrap(), "Bearer abc");

        cell.clear();
        assert!(cell.current().is_none());
    }
}
