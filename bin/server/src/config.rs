//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the gateway,
//! loaded via the `config` crate from an optional TOML file followed by
//! `PORTER_`-prefixed environment variables. Nested keys use `__`, so
//! `PORTER_RULES__ADMIN__ACTION=auth` sets `rules.admin.action`.
//!
//! See [`OidcConfig`](porter_access::OidcConfig) for the provider settings.

use porter_access::rule::string_list;
use porter_access::{AccessPolicy, Action, OIDC_PROVIDER, OidcConfig, Rule, RuleSet};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::logging::LogFormat;

/// Environment variable naming an optional TOML configuration file.
pub const CONFIG_FILE_ENV: &str = "PORTER_CONFIG";

/// Prefix of environment variables read as configuration.
pub const ENV_PREFIX: &str = "PORTER";

/// Path of the userinfo endpoint.
pub const USERINFO_PATH: &str = "/api/v1/users";

/// Providers this build knows how to construct.
pub const KNOWN_PROVIDERS: &[&str] = &[OIDC_PROVIDER];

/// A configuration value that must never be printed.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Returns the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Base name of CSRF cookies; each login attempt appends a suffix.
    #[serde(default = "default_csrf_cookie_name")]
    pub csrf_cookie_name: String,

    /// Domain attribute for issued cookies.
    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Drops the Secure attribute so cookies work over plain HTTP.
    #[serde(default)]
    pub insecure_cookie: bool,

    #[serde(default)]
    cookie_hash_key: Option<Secret>,

    #[serde(default)]
    cookie_block_key: Option<Secret>,

    /// Fallback signing key when `cookie_hash_key` is unset.
    #[serde(default)]
    secret: Option<Secret>,

    /// Session lifetime in seconds.
    #[serde(default = "default_lifetime")]
    pub lifetime: u64,

    /// Callback path; logout lives at `{path}/logout`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Where to send users after logout.
    #[serde(default)]
    pub logout_redirect: Option<String>,

    #[serde(default)]
    pub default_action: Action,

    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default, deserialize_with = "string_list")]
    pub whitelist: Vec<String>,

    #[serde(default, deserialize_with = "string_list")]
    pub domains: Vec<String>,

    /// Accept whitelist or domain matches; when false only domains count.
    #[serde(default = "default_true")]
    pub match_whitelist_or_domain: bool,

    /// Timeout in seconds for each call to an identity provider.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout: u64,

    /// Maximum number of sessions whose access tokens are remembered.
    #[serde(default = "default_token_store_capacity")]
    pub token_store_capacity: usize,

    #[serde(default)]
    pub rules: RuleSet,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Per-provider settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub oidc: OidcConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:4181".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_cookie_name() -> String {
    "_forward_auth".to_string()
}

fn default_csrf_cookie_name() -> String {
    "_forward_auth_csrf".to_string()
}

fn default_lifetime() -> u64 {
    43_200
}

fn default_path() -> String {
    "/_oauth".to_string()
}

fn default_provider() -> String {
    OIDC_PROVIDER.to_string()
}

fn default_true() -> bool {
    true
}

fn default_provider_timeout() -> u64 {
    10
}

fn default_token_store_capacity() -> usize {
    porter_access::token_store::DEFAULT_CAPACITY
}

impl ServerConfig {
    /// Loads configuration from the optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub fn load() -> Result<Self, Report<ConfigError>> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::new(&path, config::FileFormat::Toml));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    /// Parses and validates configuration from TOML text alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or the result is invalid.
    pub fn from_toml(toml: &str) -> Result<Self, Report<ConfigError>> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::from_str(toml, config::FileFormat::Toml)),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, Report<ConfigError>> {
        let config: Self = builder
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .map_err(|e| ConfigError::Load {
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks settings that cannot be expressed in the types.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        if self.hash_key().is_empty() {
            return Err(invalid("cookie_hash_key", "a cookie_hash_key or secret must be set"));
        }

        if !self.path.starts_with('/') || self.path.len() < 2 {
            return Err(invalid("path", "must start with '/' and not be the root"));
        }

        if self.lifetime == 0 {
            return Err(invalid("lifetime", "must be greater than zero"));
        }

        if self.provider_timeout == 0 {
            return Err(invalid("provider_timeout", "must be greater than zero"));
        }

        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                field: "listen_addr".to_string(),
                reason: e.to_string(),
            })?;

        if self.default_action == Action::Auth && !is_known_provider(&self.default_provider) {
            return Err(invalid(
                "default_provider",
                &format!("unknown provider '{}'", self.default_provider),
            ));
        }

        for (name, rule) in self.rules.iter() {
            if rule.action != Action::Auth {
                continue;
            }
            let provider = self.provider_for(rule);
            if !is_known_provider(provider) {
                return Err(invalid(
                    &format!("rules.{name}.provider"),
                    &format!("unknown provider '{provider}'"),
                ));
            }
        }

        Ok(())
    }

    /// Returns the key used to authenticate cookies.
    #[must_use]
    pub fn hash_key(&self) -> &str {
        self.cookie_hash_key
            .as_ref()
            .or(self.secret.as_ref())
            .map(Secret::expose)
            .unwrap_or_default()
    }

    /// Returns the key used to encrypt cookies, if encryption is enabled.
    #[must_use]
    pub fn block_key(&self) -> Option<&str> {
        self.cookie_block_key
            .as_ref()
            .map(Secret::expose)
            .filter(|key| !key.is_empty())
    }

    /// Returns the session lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime)
    }

    /// Returns the timeout for identity provider calls.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout)
    }

    /// Returns the logout path.
    #[must_use]
    pub fn logout_path(&self) -> String {
        format!("{}/logout", self.path)
    }

    /// Returns the rule applied when nothing else matches.
    #[must_use]
    pub fn default_rule(&self) -> Rule {
        Rule {
            action: self.default_action,
            provider: Some(self.default_provider.clone()),
            ..Rule::default()
        }
    }

    /// Returns the named rule, or the default rule if none has that name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Rule {
        self.rules
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_rule())
    }

    /// Returns the provider a rule logs in with.
    #[must_use]
    pub fn provider_for<'a>(&'a self, rule: &'a Rule) -> &'a str {
        rule.provider
            .as_deref()
            .filter(|provider| !provider.is_empty())
            .unwrap_or(&self.default_provider)
    }

    /// Builds the access policy from the global lists and rules.
    #[must_use]
    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::new(
            self.whitelist.clone(),
            self.domains.clone(),
            self.match_whitelist_or_domain,
            self.rules.clone(),
        )
    }
}

fn is_known_provider(name: &str) -> bool {
    KNOWN_PROVIDERS.contains(&name)
}

fn invalid(field: &str, reason: &str) -> Report<ConfigError> {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_minimal_config() {
        let config = ServerConfig::from_toml(r#"secret = "s3cret""#).expect("config");

        assert_eq!(config.listen_addr, "0.0.0.0:4181");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.cookie_name, "_forward_auth");
        assert_eq!(config.csrf_cookie_name, "_forward_auth_csrf");
        assert!(config.cookie_domain.is_none());
        assert!(!config.insecure_cookie);
        assert_eq!(config.lifetime(), Duration::from_secs(43_200));
        assert_eq!(config.path, "/_oauth");
        assert_eq!(config.logout_path(), "/_oauth/logout");
        assert_eq!(config.default_action, Action::Auth);
        assert_eq!(config.default_provider, "oidc");
        assert!(config.match_whitelist_or_domain);
        assert_eq!(config.provider_timeout(), Duration::from_secs(10));
        assert_eq!(config.token_store_capacity, 10_000);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn hash_key_falls_back_to_secret() {
        let config = ServerConfig::from_toml(r#"secret = "fallback""#).expect("config");
        assert_eq!(config.hash_key(), "fallback");
        assert!(config.block_key().is_none());

        let config = ServerConfig::from_toml(
            r#"
            secret = "fallback"
            cookie_hash_key = "hash"
            cookie_block_key = "block"
            "#,
        )
        .expect("config");
        assert_eq!(config.hash_key(), "hash");
        assert_eq!(config.block_key(), Some("block"));
    }

    #[test]
    fn missing_signing_key_is_rejected() {
        let err = ServerConfig::from_toml("").unwrap_err();
        assert!(err.to_string().contains("cookie_hash_key"));
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = ServerConfig::from_toml(
            r#"
            secret = "s"
            path = "_oauth"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn unknown_rule_provider_is_rejected() {
        let err = ServerConfig::from_toml(
            r#"
            secret = "s"

            [rules.admin]
            action = "auth"
            provider = "github"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("rules.admin.provider"));
    }

    #[test]
    fn allow_rules_need_no_provider() {
        let config = ServerConfig::from_toml(
            r#"
            secret = "s"

            [rules.public]
            action = "allow"
            provider = "none"
            path_prefix = "/public"
            "#,
        )
        .expect("config");

        let rule = config.rule("public");
        assert_eq!(rule.action, Action::Allow);
        assert_eq!(rule.path_prefix.as_deref(), Some("/public"));
    }

    #[test]
    fn lists_accept_strings_and_arrays() {
        let config = ServerConfig::from_toml(
            r#"
            secret = "s"
            whitelist = "a@example.com, b@example.com"
            domains = ["example.com", "example.org"]

            [rules.test]
            domains = "domain1,domain2"
            "#,
        )
        .expect("config");

        assert_eq!(config.whitelist, vec!["a@example.com", "b@example.com"]);
        assert_eq!(config.domains, vec!["example.com", "example.org"]);
        assert_eq!(config.rule("test").domains, vec!["domain1", "domain2"]);
    }

    #[test]
    fn unknown_rule_name_falls_back_to_default() {
        let config = ServerConfig::from_toml(
            r#"
            secret = "s"
            default_action = "allow"
            "#,
        )
        .expect("config");

        let rule = config.rule("missing");
        assert_eq!(rule.action, Action::Allow);
        assert_eq!(config.provider_for(&rule), "oidc");
    }

    #[test]
    fn provider_settings_are_nested() {
        let config = ServerConfig::from_toml(
            r#"
            secret = "s"

            [providers.oidc]
            issuer_url = "https://auth.example.com"
            client_id = "id"
            client_secret = "shh"
            resource = "api://backend"
            "#,
        )
        .expect("config");

        let oidc = &config.providers.oidc;
        assert_eq!(oidc.issuer_url(), "https://auth.example.com");
        assert_eq!(oidc.resource(), Some("api://backend"));
        assert!(oidc.missing_fields().is_empty());
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let config = ServerConfig::from_toml(
            r#"
            secret = "hunter2"
            cookie_block_key = "swordfish"
            "#,
        )
        .expect("config");

        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("swordfish"));
    }
}
