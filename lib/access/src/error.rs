//! Error types for the porter-access crate.
//!
//! Errors are split by the layer that produces them:
//! - `CookieError`: secure cookie encoding and decoding failures
//! - `CsrfError`: login state and CSRF cookie failures
//! - `ProviderError`: identity provider failures, carried in a rootcause
//!   `Report` so each call site can add context as it propagates

use std::fmt;

/// Errors from the secure cookie codec.
///
/// Only `Expired` is recoverable by sending the user back through login.
/// Every other variant means the value was forged, damaged or produced with
/// a different key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// The encoded cookie would exceed the browser size limit.
    PayloadTooLarge { size: usize, limit: usize },
    /// The value does not have the expected structure.
    InvalidFormat { reason: String },
    /// The authentication tag did not verify.
    InvalidMac,
    /// The value was issued longer ago than the configured lifetime.
    Expired,
    /// Encryption or decryption with the block key failed.
    Encryption,
    /// The signing key is unusable.
    InvalidKey { reason: String },
}

impl fmt::Display for CookieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { size, limit } => {
                write!(f, "encoded cookie is {size} bytes, limit is {limit}")
            }
            Self::InvalidFormat { reason } => {
                write!(f, "invalid cookie format: {reason}")
            }
            Self::InvalidMac => write!(f, "cookie authentication failed"),
            Self::Expired => write!(f, "cookie has expired"),
            Self::Encryption => write!(f, "cookie encryption failed"),
            Self::InvalidKey { reason } => write!(f, "invalid cookie key: {reason}"),
        }
    }
}

impl std::error::Error for CookieError {}

impl CookieError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }
}

/// Errors from the CSRF protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfError {
    /// The `state` parameter is not `nonce|provider|redirect`.
    InvalidState { reason: String },
    /// The CSRF cookie does not match the state, or names an unknown provider.
    InvalidCsrf { reason: String },
    /// No CSRF cookie was sent for this login attempt.
    MissingCsrfCookie { name: String },
    /// The operating system could not supply random bytes.
    Entropy { reason: String },
}

impl fmt::Display for CsrfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { reason } => write!(f, "invalid CSRF state: {reason}"),
            Self::InvalidCsrf { reason } => write!(f, "invalid CSRF cookie: {reason}"),
            Self::MissingCsrfCookie { name } => write!(f, "missing CSRF cookie '{name}'"),
            Self::Entropy { reason } => write!(f, "failed to generate nonce: {reason}"),
        }
    }
}

impl std::error::Error for CsrfError {}

/// Errors from identity providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No provider with this name is configured.
    InvalidProvider { name: String },
    /// Provider configuration or discovery failed at startup.
    SetupFailed { provider: String, reason: String },
    /// The redirect URI or login URL could not be built.
    InvalidRedirect { reason: String },
    /// Exchanging the authorization code for a token failed.
    CodeExchangeFailed { provider: String, reason: String },
    /// Fetching or decoding the user identity failed.
    UserFetchFailed { provider: String, reason: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidProvider { name } => write!(f, "unknown provider '{name}'"),
            Self::SetupFailed { provider, reason } => {
                write!(f, "provider '{provider}' setup failed: {reason}")
            }
            Self::InvalidRedirect { reason } => write!(f, "invalid redirect: {reason}"),
            Self::CodeExchangeFailed { provider, reason } => {
                write!(f, "provider '{provider}' code exchange failed: {reason}")
            }
            Self::UserFetchFailed { provider, reason } => {
                write!(f, "provider '{provider}' user fetch failed: {reason}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_too_large_display() {
        let err = CookieError::PayloadTooLarge {
            size: 5000,
            limit: 4096,
        };
        assert!(err.to_string().contains("5000"));
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn invalid_format_display() {
        let err = CookieError::format("missing timestamp");
        assert!(err.to_string().contains("invalid cookie format"));
        assert!(err.to_string().contains("missing timestamp"));
    }

    #[test]
    fn missing_csrf_cookie_display() {
        let err = CsrfError::MissingCsrfCookie {
            name: "_forward_auth_csrf_abc".to_string(),
        };
        assert!(err.to_string().contains("_forward_auth_csrf_abc"));
    }

    #[test]
    fn provider_error_names_step() {
        let exchange = ProviderError::CodeExchangeFailed {
            provider: "oidc".to_string(),
            reason: "HTTP 500".to_string(),
        };
        let fetch = ProviderError::UserFetchFailed {
            provider: "oidc".to_string(),
            reason: "bad JSON".to_string(),
        };
        assert!(exchange.to_string().contains("code exchange"));
        assert!(fetch.to_string().contains("user fetch"));
        assert!(fetch.to_string().contains("oidc"));
    }
}
