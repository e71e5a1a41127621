//! Extractor for the request the reverse proxy is asking about.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, Method, Uri, request::Parts},
};
use url::Url;

use crate::error::AuthError;

pub const X_FORWARDED_METHOD: &str = "x-forwarded-method";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_URI: &str = "x-forwarded-uri";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Base the forwarded path is resolved against; only path and query are kept.
const URI_BASE: &str = "http://forwarded.invalid";

/// The original client request, rebuilt from `X-Forwarded-*` headers.
///
/// An absent header falls back to the value on the request itself, so the
/// gateway can also be called directly. A header that is present but
/// unusable rejects the request; the gateway's own request line says
/// nothing about what the client asked for.
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub method: Method,
    pub proto: String,
    pub host: String,
    pub uri: Uri,
    pub source_ip: String,
}

impl Forwarded {
    /// Rebuilds the original request from headers and the request line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidForwarded` if a forwarded header is present but
    /// cannot be read as the value it carries.
    pub fn from_parts(parts: &Parts) -> Result<Self, AuthError> {
        let headers = &parts.headers;

        let method = match header_str(headers, X_FORWARDED_METHOD)? {
            Some(m) => Method::from_bytes(m.as_bytes())
                .map_err(|e| invalid(X_FORWARDED_METHOD, e.to_string()))?,
            None => parts.method.clone(),
        };

        let proto = header_str(headers, X_FORWARDED_PROTO)?
            .map(str::to_ascii_lowercase)
            .or_else(|| parts.uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        let host = match header_str(headers, X_FORWARDED_HOST)? {
            Some(host) => host.to_string(),
            None => header_str(headers, "host")?
                .map(str::to_string)
                .or_else(|| parts.uri.authority().map(|a| a.to_string()))
                .unwrap_or_default(),
        };

        let uri = match headers.get(X_FORWARDED_URI) {
            Some(raw) => forwarded_uri(raw.as_bytes())?,
            None => parts.uri.clone(),
        };

        let source_ip = header_str(headers, X_FORWARDED_FOR)?
            .and_then(|chain| chain.split(',').next())
            .map(|ip| ip.trim().to_string())
            .unwrap_or_default();

        Ok(Self {
            method,
            proto,
            host,
            uri,
            source_ip,
        })
    }

    /// Returns the path of the original request.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the host without any port.
    #[must_use]
    pub fn hostname(&self) -> &str {
        match self.host.rsplit_once(':') {
            Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
            _ => &self.host,
        }
    }

    /// Returns true if the client connected over HTTPS.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.proto == "https"
    }

    /// Returns the full URL the client asked for.
    #[must_use]
    pub fn return_url(&self) -> String {
        let path_and_query = self
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        format!("{}://{}{}", self.proto, self.host, path_and_query)
    }

    /// Returns the callback URL on the same host.
    #[must_use]
    pub fn callback_url(&self, path: &str) -> String {
        format!("{}://{}{}", self.proto, self.host, path)
    }
}

impl<S> FromRequestParts<S> for Forwarded
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts)
    }
}

fn invalid(header: &'static str, reason: impl Into<String>) -> AuthError {
    AuthError::InvalidForwarded {
        header,
        reason: reason.into(),
    }
}

/// Returns a trimmed, non-empty header, or an error if it is not text.
fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, AuthError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| invalid(name, "not visible ASCII"))?
        .trim();
    Ok(Some(value).filter(|value| !value.is_empty()))
}

/// Parses the forwarded request target.
///
/// Proxies pass the raw target through, so it may hold UTF-8 or characters
/// such as `<` that a URI cannot carry. Those are percent-encoded and dot
/// segments are resolved before the path is matched against rules.
fn forwarded_uri(raw: &[u8]) -> Result<Uri, AuthError> {
    let raw = std::str::from_utf8(raw)
        .map_err(|_| invalid(X_FORWARDED_URI, "not UTF-8"))?
        .trim();
    if !raw.starts_with('/') {
        return Err(invalid(X_FORWARDED_URI, "not an origin-form path"));
    }

    let url = Url::parse(&format!("{URI_BASE}{raw}"))
        .map_err(|e| invalid(X_FORWARDED_URI, e.to_string()))?;
    let target = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };

    target
        .parse::<Uri>()
        .map_err(|e| invalid(X_FORWARDED_URI, e.to_string()))
}
