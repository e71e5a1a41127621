//! Authenticated cookie values.
//!
//! A cookie value is `base64url(issued_at "|" body "|" tag)` where `body` is
//! the base64url payload (AES-256-GCM ciphertext when a block key is set)
//! and `tag` is HMAC-SHA256 over `name "|" issued_at "|" body`. Binding the
//! cookie name into the tag keeps a value minted for one cookie from being
//! accepted under another.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::{Engine, alphabet};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

use crate::error::CookieError;

/// Upper bound for `name=value` of any cookie we emit.
pub const MAX_COOKIE_SIZE: usize = 4096;

const GCM_NONCE_LEN: usize = 12;

/// Decoder for the outer layer. Accepting stray trailing bits lets a
/// damaged final character reach the tag check instead of failing early.
const OUTER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

type HmacSha256 = Hmac<Sha256>;

/// Encodes and decodes authenticated cookie values.
///
/// One codec exists per cookie kind so each carries its own lifetime; the
/// session codec uses the configured session lifetime and the CSRF codec a
/// short one. Keys are fixed for the life of the process.
#[derive(Clone)]
pub struct CookieCodec {
    mac: HmacSha256,
    cipher: Option<Aes256Gcm>,
    lifetime: Duration,
}

impl fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCodec")
            .field("encrypted", &self.cipher.is_some())
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl CookieCodec {
    /// Creates a codec from a hash key and an optional block key.
    ///
    /// The block key may be any length; it is hashed down to an AES-256 key.
    ///
    /// # Errors
    ///
    /// Returns `CookieError::InvalidKey` if the hash key is empty.
    pub fn new(
        hash_key: &[u8],
        block_key: Option<&[u8]>,
        lifetime: Duration,
    ) -> Result<Self, CookieError> {
        if hash_key.is_empty() {
            return Err(CookieError::InvalidKey {
                reason: "hash key is empty".to_string(),
            });
        }

        let mac = <HmacSha256 as Mac>::new_from_slice(hash_key).map_err(|e| {
            CookieError::InvalidKey {
                reason: e.to_string(),
            }
        })?;

        let cipher = match block_key {
            Some(key) if !key.is_empty() => {
                let digest = Sha256::digest(key);
                let cipher = Aes256Gcm::new_from_slice(digest.as_slice()).map_err(|e| {
                    CookieError::InvalidKey {
                        reason: e.to_string(),
                    }
                })?;
                Some(cipher)
            }
            _ => None,
        };

        Ok(Self {
            mac,
            cipher,
            lifetime,
        })
    }

    /// Returns a codec sharing these keys but with a different lifetime.
    #[must_use]
    pub fn with_lifetime(&self, lifetime: Duration) -> Self {
        Self {
            lifetime,
            ..self.clone()
        }
    }

    /// Encodes `payload` for the cookie `name`, issued now.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` if `name=value` would exceed
    /// [`MAX_COOKIE_SIZE`], or `Encryption` if the payload cannot be sealed.
    pub fn encode(&self, name: &str, payload: &str) -> Result<String, CookieError> {
        self.encode_at(name, payload, Utc::now().timestamp())
    }

    /// Encodes `payload` for the cookie `name` with an explicit issue time
    /// in Unix seconds.
    ///
    /// # Errors
    ///
    /// See [`CookieCodec::encode`].
    pub fn encode_at(
        &self,
        name: &str,
        payload: &str,
        issued_at: i64,
    ) -> Result<String, CookieError> {
        let body = match &self.cipher {
            Some(cipher) => seal(cipher, payload.as_bytes())?,
            None => payload.as_bytes().to_vec(),
        };
        let body = URL_SAFE_NO_PAD.encode(body);
        let timestamp = issued_at.to_string();
        let tag = self.sign(name, timestamp.as_bytes(), body.as_bytes());

        let mut raw = Vec::with_capacity(timestamp.len() + body.len() + tag.len() + 2);
        raw.extend_from_slice(timestamp.as_bytes());
        raw.push(b'|');
        raw.extend_from_slice(body.as_bytes());
        raw.push(b'|');
        raw.extend_from_slice(&tag);

        let value = URL_SAFE_NO_PAD.encode(raw);
        let size = name.len() + 1 + value.len();
        if size > MAX_COOKIE_SIZE {
            return Err(CookieError::PayloadTooLarge {
                size,
                limit: MAX_COOKIE_SIZE,
            });
        }

        Ok(value)
    }

    /// Decodes a value previously produced for the cookie `name`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for input that is not a cookie value at all,
    /// `InvalidMac` when a well-formed value does not verify, and `Expired`
    /// once the lifetime has elapsed.
    pub fn decode(&self, name: &str, value: &str) -> Result<String, CookieError> {
        self.decode_at(name, value, Utc::now().timestamp())
    }

    /// Decodes a value as if the current time were `now` (Unix seconds).
    ///
    /// The tag is checked before any field is interpreted. Once the outer
    /// base64 decodes, any damage (a lost separator, a changed trailing bit,
    /// a damaged timestamp or body) is reported as `InvalidMac`.
    ///
    /// # Errors
    ///
    /// See [`CookieCodec::decode`].
    pub fn decode_at(&self, name: &str, value: &str, now: i64) -> Result<String, CookieError> {
        if name.len() + 1 + value.len() > MAX_COOKIE_SIZE {
            return Err(CookieError::format("value exceeds size limit"));
        }

        if value.is_empty() {
            return Err(CookieError::format("value is empty"));
        }

        let raw = OUTER
            .decode(value)
            .map_err(|e| CookieError::format(format!("value is not base64: {e}")))?;

        // Only the canonical encoding of these bytes was ever issued.
        if URL_SAFE_NO_PAD.encode(&raw) != value {
            return Err(CookieError::InvalidMac);
        }

        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (Some(timestamp), Some(body), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CookieError::InvalidMac);
        };

        self.mac_for(name, timestamp, body)
            .verify_slice(tag)
            .map_err(|_| CookieError::InvalidMac)?;

        let issued_at: i64 = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| CookieError::format("timestamp is not numeric"))?;

        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        if now >= issued_at.saturating_add(lifetime) {
            return Err(CookieError::Expired);
        }

        let body = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| CookieError::format(format!("body is not base64: {e}")))?;

        let plain = match &self.cipher {
            Some(cipher) => open(cipher, &body)?,
            None => body,
        };

        String::from_utf8(plain).map_err(|_| CookieError::format("payload is not UTF-8"))
    }

    fn sign(&self, name: &str, timestamp: &[u8], body: &[u8]) -> Vec<u8> {
        self.mac_for(name, timestamp, body)
            .finalize()
            .into_bytes()
            .to_vec()
    }

    fn mac_for(&self, name: &str, timestamp: &[u8], body: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp);
        mac.update(b"|");
        mac.update(body);
        mac
    }
}

fn seal(cipher: &Aes256Gcm, plain: &[u8]) -> Result<Vec<u8>, CookieError> {
    let mut nonce = [0u8; GCM_NONCE_LEN];
    getrandom::fill(&mut nonce).map_err(|_| CookieError::Encryption)?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plain)
        .map_err(|_| CookieError::Encryption)?;

    let mut sealed = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open(cipher: &Aes256Gcm, sealed: &[u8]) -> Result<Vec<u8>, CookieError> {
    if sealed.len() < GCM_NONCE_LEN {
        return Err(CookieError::format("ciphertext is truncated"));
    }
    let (nonce, ciphertext) = sealed.split_at(GCM_NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CookieError::Encryption)
}
