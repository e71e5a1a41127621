//! The identity resolved by a provider.
//!
//! A `User` exists only for the duration of a request. The only part that
//! outlives the request is the identity string sealed into the session
//! cookie, which is checked against policy again on every request.

use serde::{Deserialize, Serialize};

/// An identity returned by an identity provider.
///
/// Field names follow the userinfo JSON most providers return, so the type
/// can be decoded straight from a resource endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Subject identifier, unique per provider.
    #[serde(rename = "sub", default)]
    id: String,
    /// Email address, if the provider shared it.
    #[serde(default)]
    email: String,
    /// Whether the provider has verified the email address.
    #[serde(rename = "verified_email", alias = "email_verified", default)]
    verified: bool,
    /// Hosted domain, for providers that report one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    hd: String,
    #[serde(rename = "given_name", default)]
    first_name: String,
    #[serde(rename = "family_name", default)]
    last_name: String,
}

impl User {
    /// Creates a user with only a subject identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>, verified: bool) -> Self {
        self.email = email.into();
        self.verified = verified;
        self
    }

    /// Sets the given and family names.
    #[must_use]
    pub fn with_names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    /// Returns the subject identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the email address, empty if unknown.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns true if the provider verified the email address.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Returns the given name, empty if unknown.
    #[must_use]
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    /// Returns the family name, empty if unknown.
    #[must_use]
    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// Returns the identity sealed into the session cookie.
    ///
    /// Policy is written in terms of email addresses, so the email is used
    /// when known and the subject otherwise.
    #[must_use]
    pub fn session_identity(&self) -> &str {
        if self.email.is_empty() {
            &self.id
        } else {
            &self.email
        }
    }
}
