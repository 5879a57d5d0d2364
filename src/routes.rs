//! Static route policy table.
//!
//! Answers three questions about an inbound request:
//!
//! - is the route subject to admission control?
//! - is it public (no credential needed)?
//! - which capabilities does it require?

use serde::{Deserialize, Serialize};

use crate::auth::Capabilities;

/// Route-to-capability rule.  The first matching rule wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRule {
    /// HTTP method, or `None` for any method.
    #[serde(default)]
    pub method: Option<String>,
    /// Exact path, or a prefix ending in `/**`.
    pub pattern: String,
    /// The caller must hold at least one of these.
    pub any_of: Vec<String>,
}

impl CapabilityRule {
    pub fn new<I, S>(method: Option<&str>, pattern: &str, any_of: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CapabilityRule {
            method: method.map(str::to_owned),
            pattern: pattern.to_owned(),
            any_of: any_of.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(method));
        method_ok && path_matches(&self.pattern, path)
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix("/**") {
        Some(prefix) => {
            path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
        }
        None => pattern == path,
    }
}

/// What a route requires of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement<'a> {
    /// Any authenticated principal.
    Authenticated,
    /// A principal holding at least one of the listed capabilities.
    AnyOf(&'a [String]),
}

impl Requirement<'_> {
    pub fn is_satisfied_by(&self, held: &Capabilities) -> bool {
        match self {
            Requirement::Authenticated => true,
            Requirement::AnyOf(wanted) => wanted.iter().any(|c| held.contains(c)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutePolicy {
    /// Paths containing any of these substrings are rate limited.
    pub rate_limited: Vec<String>,
    /// Exact paths that skip authentication.
    pub public: Vec<String>,
    pub rules: Vec<CapabilityRule>,
}

impl RoutePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate_limit(mut self, fragment: impl Into<String>) -> Self {
        self.rate_limited.push(fragment.into());
        self
    }

    pub fn public(mut self, path: impl Into<String>) -> Self {
        self.public.push(path.into());
        self
    }

    pub fn require(mut self, rule: CapabilityRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_rate_limited(&self, path: &str) -> bool {
        self.rate_limited.iter().any(|f| path.contains(f.as_str()))
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|p| p == path)
    }

    pub fn requirement(&self, method: &str, path: &str) -> Requirement<'_> {
        self.rules
            .iter()
            .find(|r| r.matches(method, path))
            .map_or(Requirement::Authenticated, |r| Requirement::AnyOf(&r.any_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoutePolicy {
        RoutePolicy::new()
            .rate_limit("/weather/today/")
            .public("/login")
            .require(CapabilityRule::new(None, "/weather/today/**", ["ADMIN", "STAFF"]))
            .require(CapabilityRule::new(Some("POST"), "/weather", ["ADMIN"]))
    }

    #[test]
    fn rate_limit_uses_substring_match() {
        let t = table();
        assert!(t.is_rate_limited("/weather/today/hanoi"));
        assert!(!t.is_rate_limited("/weather/period"));
    }

    #[test]
    fn public_routes_match_exactly() {
        let t = table();
        assert!(t.is_public("/login"));
        assert!(!t.is_public("/login/extra"));
    }

    #[test]
    fn wildcard_rule_covers_subpaths_only() {
        let t = table();
        assert!(matches!(t.requirement("GET", "/weather/today/hanoi"), Requirement::AnyOf(_)));
        assert_eq!(t.requirement("GET", "/weather/todayx"), Requirement::Authenticated);
    }

    #[test]
    fn method_restricted_rule() {
        let t = table();
        let staff: Capabilities = ["STAFF"].into_iter().collect();
        assert!(!t.requirement("post", "/weather").is_satisfied_by(&staff));
        assert!(t.requirement("GET", "/weather").is_satisfied_by(&staff));
    }
}
