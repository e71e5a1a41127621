//! Forwarding rules.
//!
//! A rule names one policy: whether matching requests bypass authentication
//! or go through it, which provider to use, and who is allowed in. Rules are
//! loaded once at startup and looked up by name afterwards.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the rule used when no configured rule matches a request.
pub const DEFAULT_RULE: &str = "default";

/// What to do with a request matched by a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Let the request through without inspecting cookies.
    Allow,
    /// Require an authenticated identity that passes policy.
    #[default]
    Auth,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Auth => write!(f, "auth"),
        }
    }
}

/// A single forwarding rule.
///
/// The match fields (`host`, `path_prefix`, `methods`) are only read by the
/// request matcher; the authorization core uses the action, provider and
/// identity lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub action: Action,
    /// Provider used to log in; falls back to the default provider.
    #[serde(default)]
    pub provider: Option<String>,
    /// Identities allowed by exact match.
    #[serde(default, deserialize_with = "string_list")]
    pub whitelist: Vec<String>,
    /// Email domains allowed.
    #[serde(default, deserialize_with = "string_list")]
    pub domains: Vec<String>,
    /// Host pattern, either exact or `*.suffix`.
    #[serde(default)]
    pub host: Option<String>,
    /// Required path prefix.
    #[serde(default)]
    pub path_prefix: Option<String>,
    /// Allowed HTTP methods; empty allows any.
    #[serde(default, deserialize_with = "string_list")]
    pub methods: Vec<String>,
}

impl Rule {
    /// Returns true if this rule carries its own whitelist or domains.
    #[must_use]
    pub fn has_policy(&self) -> bool {
        !self.whitelist.is_empty() || !self.domains.is_empty()
    }
}

/// Named rules, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(BTreeMap<String, Rule>);

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a rule.
    pub fn insert(&mut self, name: impl Into<String>, rule: Rule) {
        self.0.insert(name.into(), rule);
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.0.get(name)
    }

    /// Iterates rules in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.0.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Rule)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (String, Rule)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Accepts either a list of strings or a single comma-separated string.
///
/// Environment variables can only carry strings, so `a.com, b.com` and
/// `["a.com", "b.com"]` must decode to the same list.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    let items = match StringOrList::deserialize(deserializer)? {
        StringOrList::One(joined) => joined.split(',').map(str::to_string).collect(),
        StringOrList::Many(items) => items,
    };

    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}
