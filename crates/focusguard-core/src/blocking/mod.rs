//! Site blocking: pattern validation, user site lists, temporary allowances,
//! and the engine that keeps installed intercept rules in line with them.

mod allowance;
mod debounce;
mod engine;
mod pattern;
mod plan;
mod sites;

pub use allowance::TemporaryAllowance;
pub use debounce::Debouncer;
pub use engine::{BlockingEngine, EngineOptions, EnginePhase};
pub use pattern::{canonical_key, SitePattern, REGEX_PREFIX};
pub use plan::{
    desired_rules, permanent_allow_rules, BlockingInputs, RulePlan, FIRST_BLOCK_ID, MAX_RULE_ID,
};
pub use sites::{BlockListEntry, SiteLists};

use async_trait::async_trait;

/// One-way notification from the session machine that the session record
/// changed and blocking must be recomputed.
#[async_trait]
pub trait BlockingSignal: Send + Sync {
    async fn session_changed(&self);
}
