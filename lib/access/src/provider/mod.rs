//! Identity providers.
//!
//! A provider turns an authorization code into a [`User`]. Providers are set
//! up once at startup and then shared read-only between requests through a
//! [`ProviderRegistry`].

pub mod config;
pub mod oauth;
pub mod oidc;

use async_trait::async_trait;
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub use config::{OidcConfig, OidcConfigBuilder};
pub use oidc::{OIDC_PROVIDER, OidcProvider};

use crate::error::ProviderError;
use crate::user::User;

/// An OAuth2 based identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Name the provider is configured and looked up under.
    fn name(&self) -> &str;

    /// Validates configuration and performs discovery.
    ///
    /// Called once before the provider serves any request.
    async fn setup(&mut self) -> Result<(), Report<ProviderError>>;

    /// Builds the URL that starts a login, carrying `state` verbatim.
    fn login_url(&self, redirect_uri: &str, state: &str) -> Result<String, Report<ProviderError>>;

    /// Exchanges an authorization code for the provider's token.
    async fn exchange_code(&self, redirect_uri: &str, code: &str) -> Result<String, Report<ProviderError>>;

    /// Resolves the user a token belongs to.
    async fn get_user(&self, token: &str) -> Result<User, Report<ProviderError>>;

    /// Exchanges a code and resolves the user in one step.
    ///
    /// Returns the user together with the access token so it can be kept
    /// for later userinfo lookups.
    async fn get_user_from_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(User, String), Report<ProviderError>>;

    /// Fetches the current user for a previously issued access token.
    async fn user_info(&self, access_token: &str) -> Result<User, Report<ProviderError>>;
}

/// Providers by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets up each provider and registers it.
    ///
    /// # Errors
    ///
    /// Returns the first setup failure; nothing is registered in that case.
    pub async fn setup(
        providers: Vec<Box<dyn IdentityProvider>>,
    ) -> Result<Self, Report<ProviderError>> {
        let mut registry = Self::new();
        for mut provider in providers {
            provider.setup().await?;
            info!(provider = provider.name(), "identity provider ready");
            registry.register(Arc::from(provider));
        }
        Ok(registry)
    }

    /// Adds a provider that is already set up.
    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Looks up a provider by name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidProvider` if no provider has that name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn IdentityProvider>, Report<ProviderError>> {
        Ok(self
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidProvider {
                name: name.to_string(),
            })?)
    }

    /// Returns true if a provider has that name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Iterates provider names in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}
