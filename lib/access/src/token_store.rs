//! Access tokens kept for the userinfo endpoint.
//!
//! The session cookie only carries the user's identity. To answer userinfo
//! requests the access token issued at login is remembered here, keyed by the
//! session cookie value. Entries expire with the session and the store is
//! bounded so churn cannot grow it without limit.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Default number of sessions remembered.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A remembered access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    provider: String,
    access_token: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// Returns the name of the provider that issued the token.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session to access token map shared by all requests.
#[derive(Debug)]
pub struct TokenStore {
    entries: Mutex<HashMap<String, StoredToken>>,
    lifetime: Duration,
    capacity: usize,
}

impl TokenStore {
    /// Creates a store whose entries live for `lifetime`.
    #[must_use]
    pub fn new(lifetime: std::time::Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            lifetime: Duration::from_std(lifetime).unwrap_or_else(|_| Duration::days(36_500)),
            capacity,
        }
    }

    /// Remembers the token issued for `session`.
    pub async fn insert(&self, session: &str, provider: &str, access_token: &str) {
        self.insert_at(session, provider, access_token, Utc::now())
            .await;
    }

    /// Remembers a token as if inserted at `now`.
    ///
    /// When full, expired entries are dropped first and then the oldest.
    pub async fn insert_at(
        &self,
        session: &str,
        provider: &str,
        access_token: &str,
        now: DateTime<Utc>,
    ) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries.lock().await;

        if !entries.contains_key(session) && entries.len() >= self.capacity {
            entries.retain(|_, token| !token.is_expired_at(now));

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, token)| token.created_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            session.to_string(),
            StoredToken {
                provider: provider.to_string(),
                access_token: access_token.to_string(),
                created_at: now,
                expires_at: now + self.lifetime,
            },
        );
    }

    /// Looks up the token for `session`.
    pub async fn get(&self, session: &str) -> Option<StoredToken> {
        self.get_at(session, Utc::now()).await
    }

    /// Looks up the token for `session` as of `now`, dropping it if expired.
    pub async fn get_at(&self, session: &str, now: DateTime<Utc>) -> Option<StoredToken> {
        let mut entries = self.entries.lock().await;
        match entries.get(session) {
            Some(token) if token.is_expired_at(now) => {
                entries.remove(session);
                None
            }
            Some(token) => Some(token.clone()),
            None => None,
        }
    }

    /// Forgets the token for `session`.
    pub async fn remove(&self, session: &str) -> Option<StoredToken> {
        self.entries.lock().await.remove(session)
    }

    /// Returns the number of remembered sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns true if nothing is remembered.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(43_200), DEFAULT_CAPACITY)
    }
}
