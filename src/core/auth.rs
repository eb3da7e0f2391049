//! Static shared-token authorization
//!
//! Webhook and admin routes require an `Authorization` header whose value is
//! exactly the configured token. No scheme prefix is stripped.

use super::error::AuthError;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use std::fmt;

/// Checks the `Authorization` header against the configured token
#[derive(Clone)]
pub struct TokenAuth {
    token: String,
}

impl TokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Verify a raw header value
    pub fn verify_value(&self, value: Option<&str>) -> Result<(), AuthError> {
        match value {
            None => Err(AuthError::MissingToken),
            Some(v) if v == self.token => Ok(()),
            Some(_) => Err(AuthError::InvalidToken),
        }
    }

    /// Verify the `Authorization` header of a request
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let value = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());
        self.verify_value(value)
    }
}

impl fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuth").field("token", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_exact_match_required() {
        let auth = TokenAuth::new("123");

        assert!(auth.verify_value(Some("123")).is_ok());
        assert!(matches!(
            auth.verify_value(Some("WRONG")),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.verify_value(Some("Bearer 123")),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.verify_value(Some("123 ")),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(auth.verify_value(None), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_verify_headers() {
        let auth = TokenAuth::new("secret");
        let mut headers = HeaderMap::new();
        assert!(auth.verify(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("secret"));
        assert!(auth.verify(&headers).is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let auth = TokenAuth::new("super-secret");
        assert!(!format!("{:?}", auth).contains("super-secret"));
    }
}
