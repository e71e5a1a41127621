//! OAuth2 plumbing shared by providers.
//!
//! Every provider that speaks the authorization code flow builds login URLs
//! and exchanges codes the same way; only the endpoints and the way the user
//! is resolved afterwards differ.

use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, ExtraTokenFields, RedirectUrl, Scope, StandardRevocableToken,
    StandardTokenResponse, TokenUrl,
};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::error::ProviderError;

/// Token response fields beyond the OAuth2 standard ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    /// Raw ID token, present when the provider speaks OpenID Connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

/// Token response returned by [`OAuthClient::exchange_code`].
pub type ProviderTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type ConfiguredClient = Client<
    BasicErrorResponse,
    ProviderTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Authorization code flow against a fixed pair of endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    provider: String,
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    scopes: Vec<String>,
    resource: Option<String>,
}

impl OAuthClient {
    /// Creates a client for the named provider.
    ///
    /// # Errors
    ///
    /// Returns `SetupFailed` if either endpoint is not a valid URL.
    pub fn new(
        provider: &str,
        client_id: &str,
        client_secret: &str,
        auth_url: &str,
        token_url: &str,
    ) -> Result<Self, Report<ProviderError>> {
        let auth_url =
            AuthUrl::new(auth_url.to_string()).map_err(|e| ProviderError::SetupFailed {
                provider: provider.to_string(),
                reason: format!("invalid authorization endpoint: {e}"),
            })?;
        let token_url =
            TokenUrl::new(token_url.to_string()).map_err(|e| ProviderError::SetupFailed {
                provider: provider.to_string(),
                reason: format!("invalid token endpoint: {e}"),
            })?;

        Ok(Self {
            provider: provider.to_string(),
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
            auth_url,
            token_url,
            scopes: Vec::new(),
            resource: None,
        })
    }

    /// Sets the scopes requested at login.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the resource indicator added to login URLs.
    #[must_use]
    pub fn with_resource(mut self, resource: Option<String>) -> Self {
        self.resource = resource;
        self
    }

    fn client(&self) -> ConfiguredClient {
        Client::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_token_uri(self.token_url.clone())
    }

    /// Builds the URL that starts a login at the provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRedirect` if `redirect_uri` is not a valid URL.
    pub fn login_url(&self, redirect_uri: &str, state: &str) -> Result<String, Report<ProviderError>> {
        let redirect_url = redirect_url(redirect_uri)?;
        let state = state.to_string();
        let client = self.client();

        let mut request = client
            .authorize_url(move || CsrfToken::new(state))
            .set_redirect_uri(Cow::Owned(redirect_url));

        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        if let Some(resource) = &self.resource {
            request = request.add_extra_param("resource", resource.clone());
        }

        let (url, _) = request.url();
        Ok(url.to_string())
    }

    /// Exchanges an authorization code at the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns `CodeExchangeFailed` on transport errors, non-2xx responses
    /// and undecodable bodies.
    pub async fn exchange_code(
        &self,
        http_client: &reqwest::Client,
        redirect_uri: &str,
        code: &str,
    ) -> Result<ProviderTokenResponse, Report<ProviderError>> {
        let redirect_url = redirect_url(redirect_uri)?;
        let client = self.client();

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_redirect_uri(Cow::Owned(redirect_url))
            .request_async(http_client)
            .await
            .map_err(|e| ProviderError::CodeExchangeFailed {
                provider: self.provider.clone(),
                reason: e.to_string(),
            })?;

        Ok(token)
    }
}

fn redirect_url(redirect_uri: &str) -> Result<RedirectUrl, Report<ProviderError>> {
    Ok(
        RedirectUrl::new(redirect_uri.to_string()).map_err(|e| ProviderError::InvalidRedirect {
            reason: format!("'{redirect_uri}': {e}"),
        })?,
    )
}
