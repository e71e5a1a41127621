//! CSRF protection for the login round trip.
//!
//! Before redirecting to a provider, a random nonce is generated and sent in
//! two places: inside the OAuth `state` parameter and inside a short-lived
//! sealed cookie whose name is derived from the nonce. The callback is only
//! honored when both carry the same nonce.
//!
//! State strings have the form `nonce|provider|redirect`. The redirect is
//! last and may itself contain `|`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::cookie::CookieCodec;
use crate::error::CsrfError;
use crate::provider::ProviderRegistry;

/// Length of a nonce produced by [`nonce`].
pub const NONCE_LEN: usize = 32;

/// Random bytes behind a nonce; base64url without padding makes 32 chars.
const NONCE_BYTES: usize = 24;

/// Characters of the nonce appended to the CSRF cookie name.
const COOKIE_SUFFIX_LEN: usize = 8;

const DELIMITER: char = '|';

/// Generates a fresh random nonce of [`NONCE_LEN`] URL-safe characters.
///
/// # Errors
///
/// Returns `Entropy` if the operating system cannot supply random bytes.
pub fn nonce() -> Result<String, CsrfError> {
    let mut bytes = [0u8; NONCE_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| CsrfError::Entropy {
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Composes the state sent to the provider.
#[must_use]
pub fn make_state(redirect: &str, provider: &str, nonce: &str) -> String {
    format!("{nonce}{DELIMITER}{provider}{DELIMITER}{redirect}")
}

/// A parsed state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfState {
    nonce: String,
    provider: String,
    redirect: String,
}

impl CsrfState {
    /// Returns the nonce.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Returns the provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the URL to send the user to after login.
    #[must_use]
    pub fn redirect(&self) -> &str {
        &self.redirect
    }
}

/// Parses a state string.
///
/// # Errors
///
/// Returns `InvalidState` unless the state has a nonce of the expected
/// length followed by a non-empty provider and redirect.
pub fn validate_state(state: &str) -> Result<CsrfState, CsrfError> {
    let mut parts = state.splitn(3, DELIMITER);
    let (Some(nonce), Some(provider), Some(redirect)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(CsrfError::InvalidState {
            reason: "expected nonce, provider and redirect".to_string(),
        });
    };

    if nonce.len() != NONCE_LEN {
        return Err(CsrfError::InvalidState {
            reason: format!("nonce must be {NONCE_LEN} characters"),
        });
    }
    if provider.is_empty() || redirect.is_empty() {
        return Err(CsrfError::InvalidState {
            reason: "empty provider or redirect".to_string(),
        });
    }

    Ok(CsrfState {
        nonce: nonce.to_string(),
        provider: provider.to_string(),
        redirect: redirect.to_string(),
    })
}

/// Returns the name of the CSRF cookie for a login attempt.
///
/// Concurrent logins from one browser get distinct cookies because the name
/// carries a prefix of the nonce.
#[must_use]
pub fn csrf_cookie_name(base: &str, nonce: &str) -> String {
    let suffix: String = nonce.chars().take(COOKIE_SUFFIX_LEN).collect();
    format!("{base}_{suffix}")
}

/// Checks a CSRF cookie against the state returned by the provider.
///
/// On success returns the state sealed in the cookie, which is authoritative
/// for the provider and redirect target.
///
/// # Errors
///
/// Returns `InvalidCsrf` if the cookie fails to decode, its nonce is not
/// exactly the state's nonce, or it names a provider that is not registered.
pub fn validate_csrf_cookie(
    codec: &CookieCodec,
    cookie_name: &str,
    value: &str,
    state: &CsrfState,
    registry: &ProviderRegistry,
) -> Result<CsrfState, CsrfError> {
    let payload = codec
        .decode(cookie_name, value)
        .map_err(|e| CsrfError::InvalidCsrf {
            reason: e.to_string(),
        })?;

    let sealed = validate_state(&payload).map_err(|e| CsrfError::InvalidCsrf {
        reason: e.to_string(),
    })?;

    if sealed.nonce != state.nonce {
        return Err(CsrfError::InvalidCsrf {
            reason: "nonce does not match state".to_string(),
        });
    }

    if !registry.contains(&sealed.provider) {
        return Err(CsrfError::InvalidCsrf {
            reason: format!("unknown provider '{}'", sealed.provider),
        });
    }

    Ok(sealed)
}
