//! Network interception API.
//!
//! Rules are `(id, priority, action, condition)` tuples in the shape of a
//! browser's dynamic request rules. The API exposes remove and add as two
//! separate calls; nothing makes the pair atomic, so callers must be ready
//! for the second call to fail after the first succeeded.

mod file;
mod memory;

pub use file::RuleFileInterceptor;
pub use memory::{FailOn, MemoryInterceptor};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, OnceLock};

use crate::error::RuleApplyError;

/// Default ceiling on installed dynamic rules.
pub const DEFAULT_RULE_LIMIT: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    /// Send the request to a page bundled with the host.
    Redirect {
        #[serde(rename = "extensionPath")]
        extension_path: String,
    },
    /// Let the request through, overriding lower-priority rules.
    Allow,
}

/// What a rule matches. Exactly one of the filters is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_filter: Option<String>,
    pub resource_types: Vec<ResourceType>,
}

impl RuleCondition {
    /// Domain-anchored filter (`||host^`): the host and all its subdomains.
    pub fn domain(host: &str) -> Self {
        Self {
            url_filter: Some(format!("||{host}^")),
            regex_filter: None,
            resource_types: vec![ResourceType::MainFrame, ResourceType::SubFrame],
        }
    }

    pub fn regex(expr: &str) -> Self {
        Self {
            url_filter: None,
            regex_filter: Some(expr.to_string()),
            resource_types: vec![ResourceType::MainFrame, ResourceType::SubFrame],
        }
    }

    /// Evaluate the condition against a URL.
    pub fn matches(&self, url: &str) -> bool {
        if let Some(filter) = &self.url_filter {
            let anchored = filter
                .strip_prefix("||")
                .map(|rest| rest.trim_end_matches('^'));
            return match (anchored, host_of(url)) {
                (Some(domain), Some(host)) => {
                    host == domain || host.ends_with(&format!(".{domain}"))
                }
                (None, _) => url.contains(filter.as_str()),
                _ => false,
            };
        }
        if let Some(expr) = &self.regex_filter {
            return compiled(expr).is_some_and(|re| re.is_match(url));
        }
        false
    }
}

/// Compiled regex filters, keyed by source. Invalid sources cache as None.
fn regex_cache() -> &'static Mutex<HashMap<String, Option<Regex>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Option<Regex>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

const REGEX_CACHE_LIMIT: usize = 10_000;

fn compiled(expr: &str) -> Option<Regex> {
    let mut cache = regex_cache().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(re) = cache.get(expr) {
        return re.clone();
    }
    if cache.len() >= REGEX_CACHE_LIMIT {
        cache.clear();
    }
    let re = Regex::new(expr).ok();
    cache.insert(expr.to_string(), re.clone());
    re
}

fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| url::Url::parse(&format!("http://{url}")).ok())?;
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterceptRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl InterceptRule {
    pub fn is_block(&self) -> bool {
        matches!(self.action, RuleAction::Redirect { .. })
    }
}

#[async_trait]
pub trait NetworkInterceptor: Send + Sync {
    /// Remove rules by id. Unknown ids are ignored.
    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleApplyError>;

    /// Add rules. Fails as a whole if any id is already installed.
    async fn add_rules(&self, rules: &[InterceptRule]) -> Result<(), RuleApplyError>;

    /// Every rule currently installed.
    async fn installed(&self) -> Result<Vec<InterceptRule>, RuleApplyError>;
}

/// Add semantics shared by the bundled interceptors.
fn add_checked(
    installed: &mut BTreeMap<u32, InterceptRule>,
    rules: &[InterceptRule],
    limit: usize,
) -> Result<(), RuleApplyError> {
    let mut incoming = BTreeMap::new();
    for rule in rules {
        if installed.contains_key(&rule.id) || incoming.insert(rule.id, rule.clone()).is_some() {
            return Err(RuleApplyError::DuplicateId(rule.id));
        }
    }
    let requested = installed.len() + incoming.len();
    if requested > limit {
        return Err(RuleApplyError::LimitExceeded { requested, limit });
    }
    installed.extend(incoming);
    Ok(())
}

/// Evaluate a URL against a rule set: the highest-priority matching rule
/// wins, and an allow rule wins a tie.
pub fn evaluate<'a>(
    rules: impl IntoIterator<Item = &'a InterceptRule>,
    url: &str,
) -> Option<&'a InterceptRule> {
    rules
        .into_iter()
        .filter(|r| r.condition.matches(url))
        .max_by_key(|r| (r.priority, !r.is_block()))
}
