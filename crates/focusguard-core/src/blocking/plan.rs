//! Pure translation of blocking inputs into the desired rule set.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use super::allowance::{is_allowed, TemporaryAllowance};
use super::pattern::{canonical_key, SitePattern};
use super::sites::BlockListEntry;
use crate::interceptor::{InterceptRule, RuleAction, RuleCondition};
use crate::session::SessionState;

/// Ids below this are reserved for permanent allow rules.
pub const FIRST_BLOCK_ID: u32 = 1000;
pub const MAX_RULE_ID: u32 = i32::MAX as u32;
pub const MAX_PERMANENT_ALLOW: usize = 99;

const BLOCK_PRIORITY: u32 = 1;
const ALLOW_PRIORITY: u32 = 2;

/// Everything the blocking predicate reads, as loaded from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockingInputs {
    pub enabled: bool,
    pub block_list: Vec<BlockListEntry>,
    pub whitelist: Vec<String>,
    pub allowances: Vec<TemporaryAllowance>,
    pub session: SessionState,
}

impl BlockingInputs {
    /// Inputs that block nothing; used when the store cannot be read.
    pub fn unblocked() -> Self {
        Self::default()
    }

    /// Sites that pass the predicate, in block-list order, without duplicates.
    pub fn blocked_sites(&self, now: DateTime<Utc>) -> Vec<SitePattern> {
        if !self.enabled || self.session != SessionState::Focus {
            return Vec::new();
        }
        let whitelist: BTreeSet<String> =
            self.whitelist.iter().filter_map(|w| canonical_key(w)).collect();

        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for entry in self.block_list.iter().filter(|e| e.is_active) {
            let pattern = match SitePattern::parse(&entry.pattern) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Ignoring invalid block list entry: {}", e);
                    continue;
                }
            };
            let key = pattern.key();
            if whitelist.contains(&key) || is_allowed(&self.allowances, &key, now) {
                continue;
            }
            if seen.insert(key) {
                out.push(pattern);
            }
        }
        out
    }
}

/// The rules the engine wants installed, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RulePlan {
    pub rules: BTreeMap<u32, InterceptRule>,
    /// Sites left out because of the rule ceiling.
    pub dropped: Vec<String>,
}

impl RulePlan {
    pub fn patterns(&self) -> BTreeSet<String> {
        self.rules
            .values()
            .filter_map(|r| {
                r.condition
                    .url_filter
                    .as_deref()
                    .and_then(|f| f.strip_prefix("||"))
                    .map(|f| f.trim_end_matches('^').to_string())
                    .or_else(|| {
                        r.condition
                            .regex_filter
                            .as_ref()
                            .map(|re| format!("{}{re}", super::pattern::REGEX_PREFIX))
                    })
            })
            .collect()
    }
}

pub fn desired_rules(
    inputs: &BlockingInputs,
    now: DateTime<Utc>,
    redirect_path: &str,
    max_rules: usize,
) -> RulePlan {
    let mut sites = inputs.blocked_sites(now);
    let dropped: Vec<String> = if sites.len() > max_rules {
        sites.split_off(max_rules).iter().map(|p| p.key()).collect()
    } else {
        Vec::new()
    };
    if !dropped.is_empty() {
        tracing::warn!(
            limit = max_rules,
            dropped = dropped.len(),
            "Block list exceeds the rule ceiling; extra sites are not blocked"
        );
    }

    // Sorted so an id depends on the site set, not on list order.
    sites.sort();
    let mut rules = BTreeMap::new();
    for pattern in sites {
        let id = block_rule_id(&pattern.key(), &rules);
        rules.insert(
            id,
            InterceptRule {
                id,
                priority: BLOCK_PRIORITY,
                action: RuleAction::Redirect {
                    extension_path: redirect_path.to_string(),
                },
                condition: pattern.condition(),
            },
        );
    }
    RulePlan { rules, dropped }
}

/// Allow rules for hosts that must stay reachable, with ids 1..=99.
pub fn permanent_allow_rules(hosts: &[String]) -> Vec<InterceptRule> {
    if hosts.len() > MAX_PERMANENT_ALLOW {
        tracing::warn!(
            count = hosts.len(),
            "Too many permanent allow hosts; extra entries ignored"
        );
    }
    hosts
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .take(MAX_PERMANENT_ALLOW)
        .zip(1u32..)
        .map(|(host, id)| InterceptRule {
            id,
            priority: ALLOW_PRIORITY,
            action: RuleAction::Allow,
            condition: RuleCondition::domain(&host),
        })
        .collect()
}

/// FNV-1a; must not change between releases since ids are persisted.
fn stable_hash(key: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn block_rule_id(key: &str, taken: &BTreeMap<u32, InterceptRule>) -> u32 {
    let span = MAX_RULE_ID - FIRST_BLOCK_ID + 1;
    let mut id = FIRST_BLOCK_ID + stable_hash(key) % span;
    while taken.contains_key(&id) {
        id = if id == MAX_RULE_ID { FIRST_BLOCK_ID } else { id + 1 };
    }
    id
}
