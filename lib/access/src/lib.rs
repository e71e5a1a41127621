//! Security core for the porter forward-authentication gateway.
//!
//! This crate provides:
//! - Authenticated, optionally encrypted cookie values with expiry (`CookieCodec`)
//! - The CSRF nonce and state protocol for the login round trip (`csrf`)
//! - Whitelist and domain policy for resolved identities (`AccessPolicy`)
//! - Forwarding rules (`Rule`, `RuleSet`)
//! - Identity providers behind one trait (`IdentityProvider`, `OidcProvider`)
//! - The session to access token store used by userinfo lookups (`TokenStore`)
//!
//! Nothing here knows about HTTP servers; the server crate maps these
//! results onto responses.
//!
//! # Example
//!
//! ```
//! use porter_access::{AccessPolicy, CookieCodec, CookieError, RuleSet};
//! use std::time::Duration;
//!
//! let codec = CookieCodec::new(b"hash-key", None, Duration::from_secs(60))?;
//! let value = codec.encode("_forward_auth", "alice@example.com")?;
//! let identity = codec.decode("_forward_auth", &value)?;
//!
//! let policy = AccessPolicy::new(
//!     Vec::new(),
//!     vec!["example.com".to_string()],
//!     true,
//!     RuleSet::new(),
//! );
//! assert!(policy.validate_email(&identity, "default"));
//! # Ok::<(), CookieError>(())
//! ```

pub mod cookie;
pub mod csrf;
pub mod error;
pub mod policy;
pub mod provider;
pub mod rule;
pub mod token_store;
pub mod user;

// Re-export main types at crate root
pub use cookie::{CookieCodec, MAX_COOKIE_SIZE};
pub use csrf::{CsrfState, NONCE_LEN};
pub use error::{CookieError, CsrfError, ProviderError};
pub use policy::AccessPolicy;
pub use provider::{
    IdentityProvider, OIDC_PROVIDER, OidcConfig, OidcConfigBuilder, OidcProvider,
    ProviderRegistry,
};
pub use rule::{Action, DEFAULT_RULE, Rule, RuleSet};
pub use token_store::{StoredToken, TokenStore};
pub use user::User;
