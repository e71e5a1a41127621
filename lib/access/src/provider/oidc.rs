//! OpenID Connect identity provider.

use async_trait::async_trait;
use oauth2::TokenResponse as _;
use openidconnect::core::{CoreClient, CoreIdToken, CoreProviderMetadata};
use openidconnect::{ClientId, ClientSecret, IssuerUrl, Nonce};
use rootcause::prelude::Report;
use std::time::Duration;
use tracing::{debug, instrument};

use super::IdentityProvider;
use super::config::OidcConfig;
use super::oauth::OAuthClient;
use crate::error::ProviderError;
use crate::user::User;

/// Name the OIDC provider registers under.
pub const OIDC_PROVIDER: &str = "oidc";

/// Identity provider backed by an OpenID Connect issuer.
///
/// Endpoints come from discovery during [`IdentityProvider::setup`]. Identity
/// is read from the verified ID token, or from `resource_uri` when one is
/// configured.
pub struct OidcProvider {
    config: OidcConfig,
    http_client: reqwest::Client,
    metadata: Option<CoreProviderMetadata>,
    oauth: Option<OAuthClient>,
    userinfo_endpoint: Option<String>,
}

impl std::fmt::Debug for OidcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcProvider")
            .field("config", &self.config)
            .field("discovered", &self.metadata.is_some())
            .field("userinfo_endpoint", &self.userinfo_endpoint)
            .finish_non_exhaustive()
    }
}

impl OidcProvider {
    /// Creates a provider that has not been set up yet.
    ///
    /// # Errors
    ///
    /// Returns `SetupFailed` if the HTTP client cannot be built.
    pub fn new(config: OidcConfig, timeout: Duration) -> Result<Self, Report<ProviderError>> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::SetupFailed {
                provider: OIDC_PROVIDER.to_string(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            config,
            http_client,
            metadata: None,
            oauth: None,
            userinfo_endpoint: None,
        })
    }

    /// Creates a provider with fixed endpoints instead of discovery.
    ///
    /// Without discovery there are no signing keys, so identity must come
    /// from `resource_uri`; ID tokens cannot be verified.
    ///
    /// # Errors
    ///
    /// Returns `SetupFailed` if an endpoint is not a valid URL.
    pub fn with_endpoints(
        config: OidcConfig,
        timeout: Duration,
        auth_url: &str,
        token_url: &str,
    ) -> Result<Self, Report<ProviderError>> {
        let mut provider = Self::new(config, timeout)?;
        let token_url = provider.config.token_endpoint().unwrap_or(token_url).to_string();
        provider.oauth = Some(provider.oauth_client(auth_url, &token_url)?);
        Ok(provider)
    }

    fn oauth_client(&self, auth_url: &str, token_url: &str) -> Result<OAuthClient, Report<ProviderError>> {
        Ok(OAuthClient::new(
            OIDC_PROVIDER,
            self.config.client_id(),
            self.config.client_secret(),
            auth_url,
            token_url,
        )?
        .with_scopes(self.config.scopes())
        .with_resource(self.config.resource().map(str::to_string)))
    }

    fn oauth(&self) -> Result<&OAuthClient, Report<ProviderError>> {
        Ok(self.oauth.as_ref().ok_or_else(|| ProviderError::SetupFailed {
            provider: OIDC_PROVIDER.to_string(),
            reason: "provider has not been set up".to_string(),
        })?)
    }

    /// Fetches the user from a JSON endpoint with a bearer token.
    async fn fetch_user(&self, endpoint: &str, access_token: &str) -> Result<User, Report<ProviderError>> {
        let fetch_failed = |reason: String| ProviderError::UserFetchFailed {
            provider: OIDC_PROVIDER.to_string(),
            reason,
        };

        let response = self
            .http_client
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_failed(format!("{endpoint} returned {status}")).into());
        }

        let user = response
            .json::<User>()
            .await
            .map_err(|e| fetch_failed(format!("invalid user JSON: {e}")))?;

        Ok(user)
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn name(&self) -> &str {
        OIDC_PROVIDER
    }

    #[instrument(skip(self), fields(issuer = %self.config.issuer_url()))]
    async fn setup(&mut self) -> Result<(), Report<ProviderError>> {
        let missing = self.config.missing_fields();
        if !missing.is_empty() {
            return Err(ProviderError::SetupFailed {
                provider: OIDC_PROVIDER.to_string(),
                reason: format!("{} must be set", missing.join(", ")),
            }
            .into());
        }

        let issuer_url = IssuerUrl::new(self.config.issuer_url().to_string()).map_err(|e| {
            ProviderError::SetupFailed {
                provider: OIDC_PROVIDER.to_string(),
                reason: format!("invalid issuer URL: {e}"),
            }
        })?;

        let metadata = CoreProviderMetadata::discover_async(issuer_url, &self.http_client)
            .await
            .map_err(|e| ProviderError::SetupFailed {
                provider: OIDC_PROVIDER.to_string(),
                reason: format!("failed to discover provider: {e}"),
            })?;

        let auth_url = metadata.authorization_endpoint().url().as_str().to_string();
        let token_url = match self.config.token_endpoint() {
            Some(endpoint) => endpoint.to_string(),
            None => metadata
                .token_endpoint()
                .map(|endpoint| endpoint.url().as_str().to_string())
                .ok_or_else(|| ProviderError::SetupFailed {
                    provider: OIDC_PROVIDER.to_string(),
                    reason: "issuer does not advertise a token endpoint".to_string(),
                })?,
        };

        self.oauth = Some(self.oauth_client(&auth_url, &token_url)?);
        self.userinfo_endpoint = metadata
            .userinfo_endpoint()
            .map(|endpoint| endpoint.url().as_str().to_string());
        self.metadata = Some(metadata);

        debug!(auth_url, token_url, "discovered OIDC endpoints");
        Ok(())
    }

    fn login_url(&self, redirect_uri: &str, state: &str) -> Result<String, Report<ProviderError>> {
        self.oauth()?.login_url(redirect_uri, state)
    }

    async fn exchange_code(&self, redirect_uri: &str, code: &str) -> Result<String, Report<ProviderError>> {
        let token = self
            .oauth()?
            .exchange_code(&self.http_client, redirect_uri, code)
            .await?;

        Ok(token
            .extra_fields()
            .id_token
            .clone()
            .ok_or_else(|| ProviderError::CodeExchangeFailed {
                provider: OIDC_PROVIDER.to_string(),
                reason: "no ID token in response".to_string(),
            })?)
    }

    async fn get_user(&self, token: &str) -> Result<User, Report<ProviderError>> {
        let invalid = |reason: String| ProviderError::UserFetchFailed {
            provider: OIDC_PROVIDER.to_string(),
            reason,
        };

        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| invalid("ID tokens cannot be verified without discovery".to_string()))?;

        let client = CoreClient::from_provider_metadata(
            metadata.clone(),
            ClientId::new(self.config.client_id().to_string()),
            Some(ClientSecret::new(self.config.client_secret().to_string())),
        );

        let id_token: CoreIdToken =
            serde_json::from_value(serde_json::Value::String(token.to_string()))
                .map_err(|e| invalid(format!("malformed ID token: {e}")))?;

        // The nonce is carried in the CSRF state, not the ID token.
        let claims = id_token
            .claims(&client.id_token_verifier(), |_: Option<&Nonce>| -> Result<(), String> {
                Ok(())
            })
            .map_err(|e| invalid(format!("ID token validation failed: {e}")))?;

        let email = claims
            .email()
            .map(|e| e.as_str().to_string())
            .unwrap_or_default();
        let first_name = claims
            .given_name()
            .and_then(|n| n.get(None))
            .map(|n| n.as_str().to_string())
            .unwrap_or_default();
        let last_name = claims
            .family_name()
            .and_then(|n| n.get(None))
            .map(|n| n.as_str().to_string())
            .unwrap_or_default();

        Ok(User::new(claims.subject().to_string())
            .with_email(email, claims.email_verified().unwrap_or(false))
            .with_names(first_name, last_name))
    }

    async fn get_user_from_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(User, String), Report<ProviderError>> {
        let token = self
            .oauth()?
            .exchange_code(&self.http_client, redirect_uri, code)
            .await?;
        let access_token = token.access_token().secret().clone();

        let user = match self.config.resource_uri() {
            Some(resource_uri) => self.fetch_user(resource_uri, &access_token).await?,
            None => {
                let id_token = token.extra_fields().id_token.as_deref().ok_or_else(|| {
                    ProviderError::UserFetchFailed {
                        provider: OIDC_PROVIDER.to_string(),
                        reason: "no ID token in response".to_string(),
                    }
                })?;
                self.get_user(id_token).await?
            }
        };

        Ok((user, access_token))
    }

    async fn user_info(&self, access_token: &str) -> Result<User, Report<ProviderError>> {
        let endpoint = self
            .config
            .resource_uri()
            .or(self.userinfo_endpoint.as_deref())
            .ok_or_else(|| ProviderError::UserFetchFailed {
                provider: OIDC_PROVIDER.to_string(),
                reason: "no userinfo endpoint configured".to_string(),
            })?;

        self.fetch_user(endpoint, access_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REDIRECT: &str = "https://app.example.com/_oauth";

    fn config(issuer: &str, resource_uri: Option<String>) -> OidcConfig {
        let builder = OidcConfig::builder(
            issuer.to_string(),
            "idtest".to_string(),
            "sectest".to_string(),
        );
        match resource_uri {
            Some(uri) => builder.resource_uri(uri).build(),
            None => builder.build(),
        }
    }

    async fn mock_token(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn provider(server: &MockServer, resource_uri: Option<String>) -> OidcProvider {
        OidcProvider::with_endpoints(
            config(&server.uri(), resource_uri),
            Duration::from_secs(5),
            &format!("{}/authorize", server.uri()),
            &format!("{}/token", server.uri()),
        )
        .expect("provider")
    }

    #[tokio::test]
    async fn setup_reports_missing_fields() {
        let mut provider =
            OidcProvider::new(OidcConfig::default(), Duration::from_secs(1)).expect("provider");

        let err = provider.setup().await.unwrap_err().to_string();

        assert!(err.contains("providers.oidc.issuer_url"));
        assert!(err.contains("providers.oidc.client_id"));
        assert!(err.contains("providers.oidc.client_secret"));
    }

    #[tokio::test]
    async fn setup_rejects_invalid_issuer() {
        let mut provider = OidcProvider::new(config("not a url", None), Duration::from_secs(1))
            .expect("provider");

        let err = provider.setup().await.unwrap_err().to_string();
        assert!(err.contains("invalid issuer URL"));
    }

    #[tokio::test]
    async fn setup_fails_when_discovery_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut provider =
            OidcProvider::new(config(&server.uri(), None), Duration::from_secs(5)).expect("provider");

        let err = provider.setup().await.unwrap_err().to_string();
        assert!(err.contains("failed to discover provider"));
    }

    #[test]
    fn login_url_requires_setup() {
        let provider = OidcProvider::new(config("https://auth.example.com", None), Duration::from_secs(1))
            .expect("provider");

        let err = provider.login_url(REDIRECT, "state").unwrap_err().to_string();
        assert!(err.contains("has not been set up"));
    }

    #[tokio::test]
    async fn login_url_uses_configured_endpoint() {
        let server = MockServer::start().await;
        let provider = provider(&server, None);

        let login = provider.login_url(REDIRECT, "state").expect("login url");
        assert!(login.starts_with(&format!("{}/authorize?", server.uri())));
        assert!(login.contains("client_id=idtest"));
        assert!(login.contains("state=state"));
    }

    #[tokio::test]
    async fn user_from_code_via_resource_uri() {
        let server = MockServer::start().await;
        mock_token(
            &server,
            json!({"access_token": "aodifuvboadifubv", "token_type": "bearer"}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", "Bearer aodifuvboadifubv"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "1",
                "email": "example@example.com",
                "verified_email": true
            })))
            .mount(&server)
            .await;

        let provider = provider(&server, Some(format!("{}/userinfo", server.uri())));
        let (user, access_token) = provider
            .get_user_from_code("code", REDIRECT)
            .await
            .expect("user");

        assert_eq!(user.id(), "1");
        assert_eq!(user.email(), "example@example.com");
        assert!(user.is_verified());
        assert_eq!(access_token, "aodifuvboadifubv");
    }

    #[tokio::test]
    async fn user_from_code_fails_when_exchange_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;

        let provider = provider(&server, Some(format!("{}/userinfo", server.uri())));
        let err = provider
            .get_user_from_code("code", REDIRECT)
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("code exchange failed"));
    }

    #[tokio::test]
    async fn unresponsive_token_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "abc", "token_type": "bearer"}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let provider = OidcProvider::with_endpoints(
            config(&server.uri(), Some(format!("{}/userinfo", server.uri()))),
            Duration::from_millis(200),
            &format!("{}/authorize", server.uri()),
            &format!("{}/token", server.uri()),
        )
        .expect("provider");

        let started = std::time::Instant::now();
        let err = provider
            .get_user_from_code("code", REDIRECT)
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("code exchange failed"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn user_from_code_fails_on_resource_error() {
        let server = MockServer::start().await;
        mock_token(&server, json!({"access_token": "abc", "token_type": "bearer"})).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = provider(&server, Some(format!("{}/userinfo", server.uri())));
        let err = provider
            .get_user_from_code("code", REDIRECT)
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("user fetch failed"));
    }

    #[tokio::test]
    async fn user_from_code_rejects_invalid_user_json() {
        let server = MockServer::start().await;
        mock_token(&server, json!({"access_token": "abc", "token_type": "bearer"})).await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let provider = provider(&server, Some(format!("{}/userinfo", server.uri())));
        let err = provider
            .get_user_from_code("code", REDIRECT)
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("invalid user JSON"));
    }

    #[tokio::test]
    async fn user_from_code_without_id_token_fails() {
        let server = MockServer::start().await;
        mock_token(&server, json!({"access_token": "abc", "token_type": "bearer"})).await;

        let provider = provider(&server, None);
        let err = provider
            .get_user_from_code("code", REDIRECT)
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("no ID token"));
    }

    #[tokio::test]
    async fn exchange_code_returns_id_token() {
        let server = MockServer::start().await;
        mock_token(
            &server,
            json!({"access_token": "abc", "token_type": "bearer", "id_token": "a.b.c"}),
        )
        .await;

        let provider = provider(&server, None);
        let id_token = provider.exchange_code(REDIRECT, "code").await.expect("token");
        assert_eq!(id_token, "a.b.c");
    }

    #[tokio::test]
    async fn get_user_requires_discovery() {
        let server = MockServer::start().await;
        let provider = provider(&server, None);

        let err = provider.get_user("a.b.c").await.unwrap_err().to_string();
        assert!(err.contains("without discovery"));
    }

    #[tokio::test]
    async fn user_info_uses_resource_uri() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "42",
                "email": "someone@example.com"
            })))
            .mount(&server)
            .await;

        let provider = provider(&server, Some(format!("{}/me", server.uri())));
        let user = provider.user_info("token-1").await.expect("user");

        assert_eq!(user.id(), "42");
        assert_eq!(user.email(), "someone@example.com");
    }

    #[tokio::test]
    async fn user_info_without_endpoint_fails() {
        let server = MockServer::start().await;
        let provider = provider(&server, None);

        let err = provider.user_info("token").await.unwrap_err().to_string();
        assert!(err.contains("no userinfo endpoint"));
    }
}
