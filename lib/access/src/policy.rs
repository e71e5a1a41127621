//! Whitelist and domain policy for resolved identities.

use crate::rule::RuleSet;

/// Decides whether an identity may pass a rule.
///
/// A rule with its own whitelist or domains replaces the global lists
/// entirely; the two are never merged.
///
/// With `match_whitelist_or_domain` set, an identity passes if it is on the
/// whitelist or its email domain is listed, and empty lists allow everyone.
/// With it cleared, only the domain list is consulted and an empty domain
/// list allows no one.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    whitelist: Vec<String>,
    domains: Vec<String>,
    match_whitelist_or_domain: bool,
    rules: RuleSet,
}

impl AccessPolicy {
    /// Creates a policy from the global lists and the configured rules.
    #[must_use]
    pub fn new(
        whitelist: Vec<String>,
        domains: Vec<String>,
        match_whitelist_or_domain: bool,
        rules: RuleSet,
    ) -> Self {
        Self {
            whitelist,
            domains,
            match_whitelist_or_domain,
            rules,
        }
    }

    /// Returns true if `email` may pass the rule named `rule_name`.
    #[must_use]
    pub fn validate_email(&self, email: &str, rule_name: &str) -> bool {
        let (whitelist, domains) = match self.rules.get(rule_name) {
            Some(rule) if rule.has_policy() => (&rule.whitelist, &rule.domains),
            _ => (&self.whitelist, &self.domains),
        };

        if !self.match_whitelist_or_domain {
            return validate_domains(email, domains);
        }

        if whitelist.is_empty() && domains.is_empty() {
            return true;
        }

        validate_whitelist(email, whitelist) || validate_domains(email, domains)
    }
}

/// Returns true if `email` exactly equals a whitelist entry.
#[must_use]
pub fn validate_whitelist(email: &str, whitelist: &[String]) -> bool {
    whitelist.iter().any(|allowed| allowed == email)
}

/// Returns true if the domain of `email` equals one of `domains`.
///
/// The domain is everything after the last `@`; comparison ignores ASCII
/// case. Values without an `@` have no domain and never match.
#[must_use]
pub fn validate_domains(email: &str, domains: &[String]) -> bool {
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if domain.is_empty() {
        return false;
    }
    domains
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(domain))
}
