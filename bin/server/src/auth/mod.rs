//! Forward authentication.
//!
//! This module provides:
//! - The `Forwarded` extractor that rebuilds the proxied request
//! - Cookie construction for session and CSRF cookies
//! - The handlers that answer the proxy: allow, authenticate, callback,
//!   logout and userinfo
//!
//! # Decision flow
//!
//! Every request the proxy forwards lands on one handler. Requests for the
//! callback, logout or userinfo paths are served directly; anything else is
//! matched to a rule. `allow` rules pass without looking at cookies. `auth`
//! rules need a session cookie whose identity passes the rule's policy;
//! without one the client is sent to the identity provider, and a cookie
//! that fails verification for any reason other than expiry is refused.

pub mod cookies;
pub mod forwarded;
pub mod handlers;

use porter_access::{AccessPolicy, CookieCodec, ProviderRegistry, TokenStore};
use rootcause::prelude::Report;

use crate::config::ServerConfig;
use crate::error::ConfigError;
use crate::matcher::{PrefixMatcher, RuleMatcher};

pub use forwarded::Forwarded;
pub use handlers::forward_auth;

/// Shared application state.
pub struct AppState {
    /// Configuration, read-only after startup.
    pub config: ServerConfig,
    /// Codec for the session cookie.
    pub session_codec: CookieCodec,
    /// Codec for CSRF cookies, sharing keys with the session codec.
    pub csrf_codec: CookieCodec,
    pub policy: AccessPolicy,
    pub providers: ProviderRegistry,
    pub matcher: Box<dyn RuleMatcher>,
    /// Access tokens for the userinfo endpoint.
    pub tokens: TokenStore,
}

impl AppState {
    /// Creates the application state from validated configuration and
    /// providers that are already set up.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie keys are unusable.
    pub fn new(config: ServerConfig, providers: ProviderRegistry) -> Result<Self, Report<ConfigError>> {
        let session_codec = CookieCodec::new(
            config.hash_key().as_bytes(),
            config.block_key().map(str::as_bytes),
            config.lifetime(),
        )
        .map_err(|e| ConfigError::Invalid {
            field: "cookie_hash_key".to_string(),
            reason: e.to_string(),
        })?;
        let csrf_codec = session_codec.with_lifetime(cookies::CSRF_LIFETIME);

        Ok(Self {
            policy: config.policy(),
            matcher: Box::new(PrefixMatcher::new(&config.rules)),
            tokens: TokenStore::new(config.lifetime(), config.token_store_capacity),
            session_codec,
            csrf_codec,
            providers,
            config,
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}
