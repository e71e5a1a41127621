//! Maps a forwarded request to the name of the rule that governs it.

use axum::http::Method;
use porter_access::RuleSet;

use crate::auth::Forwarded;

/// Chooses the rule for a request.
pub trait RuleMatcher: Send + Sync {
    /// Returns the first matching rule name, or `None` to use the default.
    fn match_rule(&self, request: &Forwarded) -> Option<&str>;
}

/// Host pattern: exact, or `*.suffix` for any subdomain of `suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    Subdomain(String),
}

impl HostPattern {
    fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(suffix) => Self::Subdomain(format!(".{suffix}")),
            None => Self::Exact(pattern),
        }
    }

    fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            Self::Exact(exact) => host == *exact,
            Self::Subdomain(suffix) => host.len() > suffix.len() && host.ends_with(suffix.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    host: Option<HostPattern>,
    path_prefix: Option<String>,
    methods: Vec<Method>,
}

impl CompiledRule {
    fn matches(&self, request: &Forwarded) -> bool {
        let host_ok = self
            .host
            .as_ref()
            .is_none_or(|host| host.matches(request.hostname()));
        let path_ok = self
            .path_prefix
            .as_ref()
            .is_none_or(|prefix| request.path().starts_with(prefix.as_str()));
        let method_ok = self.methods.is_empty() || self.methods.contains(&request.method);
        host_ok && path_ok && method_ok
    }
}

/// Matches rules by host pattern, path prefix and method.
///
/// Rules are tried in name order and every predicate a rule sets must hold.
/// A rule without any predicate never matches; it can still be selected
/// through the default rule name.
#[derive(Debug, Clone, Default)]
pub struct PrefixMatcher {
    rules: Vec<CompiledRule>,
}

impl PrefixMatcher {
    /// Compiles the match predicates of `rules`.
    #[must_use]
    pub fn new(rules: &RuleSet) -> Self {
        let rules = rules
            .iter()
            .filter_map(|(name, rule)| {
                let methods: Vec<Method> = rule
                    .methods
                    .iter()
                    .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
                    .collect();
                let compiled = CompiledRule {
                    name: name.to_string(),
                    host: rule
                        .host
                        .as_deref()
                        .filter(|h| !h.is_empty())
                        .map(HostPattern::parse),
                    path_prefix: rule.path_prefix.clone().filter(|p| !p.is_empty()),
                    methods,
                };
                if compiled.host.is_none()
                    && compiled.path_prefix.is_none()
                    && compiled.methods.is_empty()
                {
                    tracing::debug!(rule = name, "rule has no match predicates");
                    None
                } else {
                    Some(compiled)
                }
            })
            .collect();

        Self { rules }
    }
}

impl RuleMatcher for PrefixMatcher {
    fn match_rule(&self, request: &Forwarded) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(|rule| rule.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;
    use porter_access::Rule;

    fn request(method: Method, host: &str, uri: &str) -> Forwarded {
        Forwarded {
            method,
            proto: "https".to_string(),
            host: host.to_string(),
            uri: uri.parse::<Uri>().expect("uri"),
            source_ip: String::new(),
        }
    }

    fn rule(host: Option<&str>, path_prefix: Option<&str>, methods: &[&str]) -> Rule {
        Rule {
            host: host.map(str::to_string),
            path_prefix: path_prefix.map(str::to_string),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            ..Rule::default()
        }
    }

    #[test]
    fn unmatched_request_falls_through() {
        let mut rules = RuleSet::new();
        rules.insert("api", rule(None, Some("/api"), &[]));
        let matcher = PrefixMatcher::new(&rules);

        assert_eq!(matcher.match_rule(&request(Method::GET, "a.com", "/")), None);
    }

    #[test]
    fn first_match_in_name_order_wins() {
        let mut rules = RuleSet::new();
        rules.insert("b-broad", rule(None, Some("/"), &[]));
        rules.insert("a-narrow", rule(None, Some("/admin"), &[]));
        let matcher = PrefixMatcher::new(&rules);

        assert_eq!(
            matcher.match_rule(&request(Method::GET, "a.com", "/admin/x")),
            Some("a-narrow")
        );
        assert_eq!(
            matcher.match_rule(&request(Method::GET, "a.com", "/public")),
            Some("b-broad")
        );
    }

    #[test]
    fn host_patterns() {
        let mut rules = RuleSet::new();
        rules.insert("exact", rule(Some("app.example.com"), None, &[]));
        rules.insert("wild", rule(Some("*.example.org"), None, &[]));
        let matcher = PrefixMatcher::new(&rules);

        assert_eq!(
            matcher.match_rule(&request(Method::GET, "APP.example.com:443", "/")),
            Some("exact")
        );
        assert_eq!(
            matcher.match_rule(&request(Method::GET, "a.b.example.org", "/")),
            Some("wild")
        );
        assert_eq!(matcher.match_rule(&request(Method::GET, "example.org", "/")), None);
        assert_eq!(matcher.match_rule(&request(Method::GET, "badexample.org", "/")), None);
    }

    #[test]
    fn all_predicates_must_hold() {
        let mut rules = RuleSet::new();
        rules.insert(
            "writes",
            rule(Some("api.example.com"), Some("/v1"), &["post", "PUT"]),
        );
        let matcher = PrefixMatcher::new(&rules);

        assert_eq!(
            matcher.match_rule(&request(Method::POST, "api.example.com", "/v1/items")),
            Some("writes")
        );
        assert_eq!(
            matcher.match_rule(&request(Method::GET, "api.example.com", "/v1/items")),
            None
        );
        assert_eq!(
            matcher.match_rule(&request(Method::PUT, "api.example.com", "/v2/items")),
            None
        );
    }

    #[test]
    fn rules_without_predicates_never_match() {
        let mut rules = RuleSet::new();
        rules.insert("policy-only", Rule::default());
        let matcher = PrefixMatcher::new(&rules);

        assert_eq!(matcher.match_rule(&request(Method::GET, "a.com", "/")), None);
    }
}
