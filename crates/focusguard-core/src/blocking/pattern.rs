//! Site pattern normalization.
//!
//! Block-list and whitelist entries are either a domain (matched together
//! with every subdomain) or an explicit regular expression written with the
//! `regex:` prefix. Anything else is rejected before it reaches the store.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::ValidationError;
use crate::interceptor::RuleCondition;

pub const REGEX_PREFIX: &str = "regex:";

fn domain_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9_-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9_-]*[a-z0-9])?)*\.[a-z]{2,}$")
            .expect("domain shape regex is valid")
    })
}

fn scheme_prefix() -> &'static Regex {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    SCHEME.get_or_init(|| Regex::new(r"^[a-z][a-z0-9+.-]*://").expect("scheme regex is valid"))
}

/// A validated, normalized site pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SitePattern {
    /// Bare domain, e.g. `x.com`. Matches `x.com` and `*.x.com`.
    Domain(String),
    /// Raw regular expression matched against the full URL.
    Regex(String),
}

impl SitePattern {
    /// Normalize and validate user input.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidPattern`] when the input is neither a
    /// domain nor a compilable `regex:` expression.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::invalid_pattern(raw, "pattern is empty"));
        }

        if let Some(expr) = trimmed.strip_prefix(REGEX_PREFIX) {
            let expr = expr.trim();
            if expr.is_empty() {
                return Err(ValidationError::invalid_pattern(raw, "regex is empty"));
            }
            Regex::new(expr)
                .map_err(|e| ValidationError::invalid_pattern(raw, e.to_string()))?;
            return Ok(SitePattern::Regex(expr.to_string()));
        }

        let domain = normalize_domain(trimmed);
        if !domain_shape().is_match(&domain) {
            return Err(ValidationError::invalid_pattern(
                raw,
                "expected a domain such as example.com or a regex: pattern",
            ));
        }
        Ok(SitePattern::Domain(domain))
    }

    /// Canonical text form, used as the identity of the site everywhere.
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, SitePattern::Regex(_))
    }

    /// The interception condition that matches this pattern.
    pub fn condition(&self) -> RuleCondition {
        match self {
            SitePattern::Domain(domain) => RuleCondition::domain(domain),
            SitePattern::Regex(expr) => RuleCondition::regex(expr),
        }
    }

    pub fn matches_url(&self, url: &str) -> bool {
        self.condition().matches(url)
    }
}

impl fmt::Display for SitePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SitePattern::Domain(domain) => write!(f, "{domain}"),
            SitePattern::Regex(expr) => write!(f, "{REGEX_PREFIX}{expr}"),
        }
    }
}

impl FromStr for SitePattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Strip scheme, wildcard, `www.`, path and port; lowercase.
fn normalize_domain(input: &str) -> String {
    let lowered = input.to_ascii_lowercase();
    let mut rest = scheme_prefix().replace(&lowered, "").into_owned();

    if let Some(stripped) = rest.strip_prefix("*.") {
        rest = stripped.to_string();
    }
    if let Some(stripped) = rest.strip_prefix("www.") {
        rest = stripped.to_string();
    }
    if let Some(end) = rest.find(['/', '?', '#']) {
        rest.truncate(end);
    }
    if let Some(colon) = rest.rfind(':') {
        if rest[colon + 1..].chars().all(|c| c.is_ascii_digit()) {
            rest.truncate(colon);
        }
    }
    rest.trim_end_matches('.').to_string()
}

/// Parse an entry and return its canonical key, or `None` when invalid.
///
/// Used when reading lists that may have been edited outside the validated
/// entry points.
pub fn canonical_key(raw: &str) -> Option<String> {
    SitePattern::parse(raw).ok().map(|p| p.key())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(s: &str) -> SitePattern {
        SitePattern::Domain(s.to_string())
    }

    #[test]
    fn strips_scheme_www_and_trailing_slash() {
        assert_eq!(SitePattern::parse("https://www.x.com/").unwrap(), domain("x.com"));
        assert_eq!(SitePattern::parse("http://Reddit.com").unwrap(), domain("reddit.com"));
        assert_eq!(SitePattern::parse("x.com///").unwrap(), domain("x.com"));
    }

    #[test]
    fn strips_wildcard_path_and_port() {
        assert_eq!(SitePattern::parse("*.youtube.com").unwrap(), domain("youtube.com"));
        assert_eq!(
            SitePattern::parse("news.ycombinator.com:443/item?id=1").unwrap(),
            domain("news.ycombinator.com")
        );
    }

    #[test]
    fn rejects_non_domain_shapes() {
        for bad in ["", "   ", "localhost", "not a site", "x.c", "http://", "-x.com", "x..com"] {
            assert!(
                matches!(SitePattern::parse(bad), Err(ValidationError::InvalidPattern { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_explicit_regex() {
        let p = SitePattern::parse(r"regex:^https?://[^/]*\.slack\.com/").unwrap();
        assert!(p.is_regex());
        assert_eq!(p.key(), r"regex:^https?://[^/]*\.slack\.com/");
        assert!(p.matches_url("https://team.slack.com/messages"));
        assert!(!p.matches_url("https://slack.org/"));
    }

    #[test]
    fn rejects_uncompilable_regex() {
        assert!(SitePattern::parse("regex:(unclosed").is_err());
        assert!(SitePattern::parse("regex:").is_err());
    }

    #[test]
    fn domain_matches_subdomains_only() {
        let p = domain("x.com");
        assert!(p.matches_url("https://x.com/home"));
        assert!(p.matches_url("https://mobile.x.com/"));
        assert!(p.matches_url("x.com"));
        assert!(!p.matches_url("https://notx.com/"));
        assert!(!p.matches_url("https://x.com.evil.org/"));
    }

    #[test]
    fn canonical_key_normalizes_or_drops() {
        assert_eq!(canonical_key("WWW.X.COM"), Some("x.com".to_string()));
        assert_eq!(canonical_key("nope"), None);
    }
}
