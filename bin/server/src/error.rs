//! Domain error types for server operations.
//!
//! Configuration errors are fatal at startup. Request errors are logged in
//! full and answered with deliberately uninformative bodies so a client
//! cannot tell which check failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use porter_access::{CookieError, CsrfError, ProviderError};
use rootcause::prelude::Report;
use std::fmt;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    Load { reason: String },
    /// A setting has an unacceptable value.
    Invalid { field: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { reason } => write!(f, "failed to load configuration: {reason}"),
            Self::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that end a forwarded request.
#[derive(Debug)]
pub enum AuthError {
    /// The session cookie failed to decode for a reason other than expiry.
    InvalidCookie(CookieError),
    /// The login round trip could not be verified.
    Csrf(CsrfError),
    /// An identity provider call failed.
    Provider(Report<ProviderError>),
    /// The identity is not allowed by the rule's policy.
    PolicyDenied { identity: String, rule: String },
    /// No session cookie was presented where one is required.
    MissingSession,
    /// No access token is remembered for the session.
    MissingToken,
    /// A forwarded header is present but cannot be used.
    InvalidForwarded { header: &'static str, reason: String },
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCookie(e) => write!(f, "invalid session cookie: {e}"),
            Self::Csrf(e) => write!(f, "{e}"),
            Self::Provider(e) => write!(f, "{e}"),
            Self::PolicyDenied { identity, rule } => {
                write!(f, "'{identity}' is not allowed by rule '{rule}'")
            }
            Self::MissingSession => write!(f, "no session cookie"),
            Self::MissingToken => write!(f, "no access token on file for session"),
            Self::InvalidForwarded { header, reason } => {
                write!(f, "unusable {header} header: {reason}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<CookieError> for AuthError {
    fn from(e: CookieError) -> Self {
        Self::InvalidCookie(e)
    }
}

impl From<CsrfError> for AuthError {
    fn from(e: CsrfError) -> Self {
        Self::Csrf(e)
    }
}

impl From<Report<ProviderError>> for AuthError {
    fn from(e: Report<ProviderError>) -> Self {
        Self::Provider(e)
    }
}

impl AuthError {
    /// Returns the status code this error is answered with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Csrf(CsrfError::Entropy { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "request failed");
            (status, "Service unavailable").into_response()
        } else {
            tracing::warn!(error = %self, "request not authorized");
            (status, "Not authorized").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8")
    }

    #[tokio::test]
    async fn tamper_and_policy_errors_are_unauthorized() {
        for error in [
            AuthError::InvalidCookie(CookieError::InvalidMac),
            AuthError::Csrf(CsrfError::InvalidCsrf {
                reason: "nonce".to_string(),
            }),
            AuthError::PolicyDenied {
                identity: "a@b.c".to_string(),
                rule: "default".to_string(),
            },
            AuthError::MissingToken,
            AuthError::InvalidForwarded {
                header: "x-forwarded-uri",
                reason: "not UTF-8".to_string(),
            },
        ] {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body(response).await, "Not authorized");
        }
    }

    #[tokio::test]
    async fn provider_errors_do_not_leak_details() {
        let report: Report<ProviderError> = ProviderError::CodeExchangeFailed {
            provider: "oidc".to_string(),
            reason: "secret detail".to_string(),
        }
        .into();
        let response = AuthError::from(report).into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(response).await, "Not authorized");
    }

    #[tokio::test]
    async fn entropy_failure_is_unavailable() {
        let response = AuthError::Csrf(CsrfError::Entropy {
            reason: "no entropy".to_string(),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body(response).await, "Service unavailable");
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Invalid {
            field: "path".to_string(),
            reason: "must start with '/'".to_string(),
        };
        assert_eq!(err.to_string(), "invalid path: must start with '/'");
    }
}
