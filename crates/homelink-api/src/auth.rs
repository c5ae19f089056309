use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Long-lived access token presented to the backend.
///
/// Used twice: as the `access_token` of the WebSocket `auth` frame and as
/// the `Authorization: Bearer` header on REST calls. The secret is never
/// printed by `Debug`.
#[derive(Debug, Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Default headers for REST requests: bearer auth + JSON content type.
    pub fn bearer_headers(&self) -> Result<HeaderMap, Error> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.expose()))
            .map_err(|e| Error::InvalidToken(e.to_string()))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl From<SecretString> for AccessToken {
    fn from(token: SecretString) -> Self {
        Self::new(token)
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self::new(SecretString::from(token.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_sensitive() {
        let token = AccessToken::from("abc.def");
        let headers = token.bearer_headers().unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer abc.def");
        assert!(auth.is_sensitive());
    }

    #[test]
    fn newline_in_token_is_rejected() {
        let token = AccessToken::from("abc\ndef");
        assert!(matches!(token.bearer_headers(), Err(Error::InvalidToken(_))));
    }

    #[test]
    fn debug_does_not_leak() {
        let token = AccessToken::from("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
