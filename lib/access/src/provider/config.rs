//! OIDC provider configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for the OIDC identity provider.
///
/// The three connection fields default to empty so that a partially
/// configured provider still loads; `OidcProvider::setup` then rejects it
/// with a message naming the missing fields.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The OIDC issuer URL, used for discovery.
    #[serde(default)]
    issuer_url: String,
    /// The OAuth2 client ID registered with the provider.
    #[serde(default)]
    client_id: String,
    /// The OAuth2 client secret.
    #[serde(default, skip_serializing)]
    client_secret: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,profile,email"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Optional resource indicator added to login URLs.
    #[serde(default)]
    resource: Option<String>,
    /// Endpoint returning the user as JSON for a bearer access token.
    /// When unset, identity comes from the ID token.
    #[serde(default)]
    resource_uri: Option<String>,
    /// Token endpoint overriding the discovered one.
    #[serde(default)]
    token_endpoint: Option<String>,
}

fn default_scopes() -> String {
    "openid,profile,email".to_string()
}

impl fmt::Debug for OidcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcConfig")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("resource", &self.resource)
            .field("resource_uri", &self.resource_uri)
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

impl OidcConfig {
    /// Creates a new OIDC configuration with defaults for optional fields.
    #[must_use]
    pub fn new(issuer_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            issuer_url,
            client_id,
            client_secret,
            scopes: default_scopes(),
            resource: None,
            resource_uri: None,
            token_endpoint: None,
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(issuer_url: String, client_id: String, client_secret: String) -> OidcConfigBuilder {
        OidcConfigBuilder::new(issuer_url, client_id, client_secret)
    }

    /// Returns the OIDC issuer URL.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the resource indicator, if any.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Returns the user resource endpoint, if any.
    #[must_use]
    pub fn resource_uri(&self) -> Option<&str> {
        self.resource_uri.as_deref()
    }

    /// Returns the token endpoint override, if any.
    #[must_use]
    pub fn token_endpoint(&self) -> Option<&str> {
        self.token_endpoint.as_deref()
    }

    /// Returns the names of required fields that are empty.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.issuer_url.trim().is_empty() {
            missing.push("providers.oidc.issuer_url");
        }
        if self.client_id.trim().is_empty() {
            missing.push("providers.oidc.client_id");
        }
        if self.client_secret.trim().is_empty() {
            missing.push("providers.oidc.client_secret");
        }
        missing
    }
}

/// Builder for `OidcConfig`.
#[derive(Debug)]
pub struct OidcConfigBuilder {
    config: OidcConfig,
    scopes: Vec<String>,
}

impl OidcConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(issuer_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            config: OidcConfig::new(issuer_url, client_id, client_secret),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
        }
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Sets the resource indicator.
    #[must_use]
    pub fn resource(mut self, resource: String) -> Self {
        self.config.resource = Some(resource);
        self
    }

    /// Sets the user resource endpoint.
    #[must_use]
    pub fn resource_uri(mut self, uri: String) -> Self {
        self.config.resource_uri = Some(uri);
        self
    }

    /// Sets the token endpoint override.
    #[must_use]
    pub fn token_endpoint(mut self, uri: String) -> Self {
        self.config.token_endpoint = Some(uri);
        self
    }

    /// Builds the `OidcConfig`.
    #[must_use]
    pub fn build(mut self) -> OidcConfig {
        self.config.scopes = self.scopes.join(",");
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_has_defaults() {
        let config = OidcConfig::new(
            "https://auth.example.com".to_string(),
            "client-id".to_string(),
            "client-secret".to_string(),
        );

        assert_eq!(config.issuer_url(), "https://auth.example.com");
        assert_eq!(config.client_id(), "client-id");
        assert_eq!(config.client_secret(), "client-secret");
        assert_eq!(config.scopes(), vec!["openid", "profile", "email"]);
        assert!(config.resource().is_none());
        assert!(config.missing_fields().is_empty());
    }

    #[test]
    fn builder_allows_customization() {
        let config = OidcConfig::builder(
            "https://auth.example.com".to_string(),
            "client-id".to_string(),
            "client-secret".to_string(),
        )
        .add_scope("openid".to_string())
        .add_scope("groups".to_string())
        .resource("api://backend".to_string())
        .resource_uri("https://auth.example.com/me".to_string())
        .token_endpoint("https://auth.example.com/token".to_string())
        .build();

        let openid_count = config.scopes().iter().filter(|s| **s == "openid").count();
        assert_eq!(openid_count, 1);
        assert!(config.scopes().contains(&"groups"));
        assert_eq!(config.resource(), Some("api://backend"));
        assert_eq!(config.resource_uri(), Some("https://auth.example.com/me"));
        assert_eq!(config.token_endpoint(), Some("https://auth.example.com/token"));
    }

    #[test]
    fn empty_config_reports_all_missing_fields() {
        let config = OidcConfig::default();
        assert_eq!(
            config.missing_fields(),
            vec![
                "providers.oidc.issuer_url",
                "providers.oidc.client_id",
                "providers.oidc.client_secret",
            ]
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "issuer_url": "https://auth.example.com",
            "client_id": "my-client",
            "client_secret": "secret"
        }"#;

        let config: OidcConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.client_id(), "my-client");
        assert_eq!(config.scopes(), vec!["openid", "profile", "email"]);
        assert!(config.token_endpoint().is_none());
    }

    #[test]
    fn secret_is_not_serialized_or_printed() {
        let config = OidcConfig::new(
            "https://auth.example.com".to_string(),
            "client-id".to_string(),
            "hunter2".to_string(),
        );

        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
