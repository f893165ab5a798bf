//! The rule engine: reconciles installed intercept rules with the desired
//! set computed from the store.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

use super::allowance::{self, TemporaryAllowance};
use super::debounce::Debouncer;
use super::pattern::SitePattern;
use super::plan::{desired_rules, permanent_allow_rules, BlockingInputs, RulePlan};
use super::sites::SiteLists;
use super::BlockingSignal;
use crate::clock::Clock;
use crate::config::BlockingConfig;
use crate::error::{Result, RuleApplyError, StoreError, ValidationError};
use crate::events::{Event, SharedEventBus};
use crate::interceptor::{evaluate, InterceptRule, NetworkInterceptor};
use crate::session::Session;
use crate::store::{keys, load, save, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Uninitialized,
    Initializing,
    Active,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub redirect_path: String,
    pub max_rules: usize,
    pub debounce: Duration,
    pub permanent_allow: Vec<String>,
    pub default_block_list: Vec<String>,
}

impl From<&BlockingConfig> for EngineOptions {
    fn from(cfg: &BlockingConfig) -> Self {
        Self {
            redirect_path: cfg.redirect_path.clone(),
            max_rules: cfg.max_rules,
            debounce: cfg.debounce(),
            permanent_allow: cfg.permanent_allow.clone(),
            default_block_list: cfg.default_block_list.clone(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&BlockingConfig::default())
    }
}

struct EngineState {
    phase: EnginePhase,
    installed: BTreeMap<u32, InterceptRule>,
    /// Set when a fail-safe clear itself failed; the next run clears first.
    needs_full_clear: bool,
}

pub struct BlockingEngine {
    store: Arc<dyn KeyValueStore>,
    interceptor: Arc<dyn NetworkInterceptor>,
    clock: Arc<dyn Clock>,
    events: SharedEventBus,
    options: EngineOptions,
    state: Mutex<EngineState>,
    phase: StdMutex<EnginePhase>,
    debounce: Debouncer,
}

impl BlockingEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        interceptor: Arc<dyn NetworkInterceptor>,
        clock: Arc<dyn Clock>,
        events: SharedEventBus,
        options: EngineOptions,
    ) -> Self {
        let debounce = Debouncer::new(options.debounce);
        Self {
            store,
            interceptor,
            clock,
            events,
            options,
            state: Mutex::new(EngineState {
                phase: EnginePhase::Uninitialized,
                installed: BTreeMap::new(),
                needs_full_clear: false,
            }),
            phase: StdMutex::new(EnginePhase::Uninitialized),
            debounce,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub async fn initialize(&self) {
        let mut state = self.state.lock().await;
        self.ensure_initialized(&mut state).await;
    }

    async fn ensure_initialized(&self, state: &mut EngineState) {
        if state.phase != EnginePhase::Uninitialized {
            return;
        }
        self.set_phase(state, EnginePhase::Initializing);
        tracing::info!("Initializing blocking engine");

        let sites = SiteLists::new(self.store.clone());
        if let Err(e) = sites.seed_defaults(&self.options.default_block_list).await {
            tracing::warn!("Could not seed default block list: {}", e);
        }
        if let Err(e) = self.sweep_expired().await {
            tracing::warn!("Could not sweep temporary allowances: {}", e);
        }

        let orphans: BTreeSet<u32> =
            match load::<Vec<u32>>(self.store.as_ref(), keys::INSTALLED_RULE_IDS).await {
                Ok(ids) => ids.unwrap_or_default().into_iter().collect(),
                Err(e) => {
                    tracing::warn!("Could not read installed rule ids: {}", e);
                    BTreeSet::new()
                }
            };

        let allow = permanent_allow_rules(&self.options.permanent_allow);
        let mut stale: BTreeSet<u32> = orphans;
        stale.extend(allow.iter().map(|r| r.id));
        let stale: Vec<u32> = stale.into_iter().collect();

        match self.interceptor.remove_rules(&stale).await {
            Ok(()) => tracing::debug!(count = stale.len(), "Removed rules from a previous run"),
            Err(e) => {
                tracing::warn!("Could not remove rules from a previous run: {}", e);
                state.installed.extend(
                    stale
                        .iter()
                        .filter(|id| **id >= super::plan::FIRST_BLOCK_ID)
                        .map(|id| (*id, orphan_placeholder(*id))),
                );
                state.needs_full_clear = true;
            }
        }
        match self.interceptor.add_rules(&allow).await {
            Ok(()) => state
                .installed
                .extend(allow.into_iter().map(|r| (r.id, r))),
            Err(e) => tracing::warn!("Could not install permanent allow rules: {}", e),
        }
        self.persist_installed(state).await;

        self.set_phase(state, EnginePhase::Active);
        tracing::info!("Blocking engine active");
    }

    fn set_phase(&self, state: &mut EngineState, phase: EnginePhase) {
        state.phase = phase;
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Debounced reconciliation. Calls inside the window after the previous
    /// run are coalesced; only the latest executes.
    pub async fn update(&self) {
        let ticket = self.debounce.ticket();
        if !self.debounce.settle(ticket).await {
            tracing::trace!(ticket, "Update superseded by a later call");
            return;
        }
        self.update_now().await;
    }

    /// Reconcile immediately, bypassing the debounce.
    pub async fn update_now(&self) {
        let mut state = self.state.lock().await;
        self.ensure_initialized(&mut state).await;
        self.sync_installed(&mut state).await;

        let inputs = match self.read_inputs().await {
            Ok(inputs) => inputs,
            Err(e) => {
                tracing::warn!("Blocking inputs unavailable, planning unblocked: {}", e);
                BlockingInputs::unblocked()
            }
        };
        let plan = desired_rules(
            &inputs,
            self.clock.now(),
            &self.options.redirect_path,
            self.options.max_rules,
        );
        self.reconcile(&mut state, plan).await;
        self.debounce.finished();
    }

    /// Adopt the interceptor's rule table as the installed set. Another
    /// process sharing the interceptor may have changed it since our last run.
    /// On a read failure the tracked set is kept.
    async fn sync_installed(&self, state: &mut EngineState) {
        match self.interceptor.installed().await {
            Ok(rules) => {
                let actual: BTreeMap<u32, InterceptRule> =
                    rules.into_iter().map(|r| (r.id, r)).collect();
                if actual != state.installed {
                    tracing::debug!(
                        tracked = state.installed.len(),
                        actual = actual.len(),
                        "Installed rules changed outside this engine"
                    );
                    state.installed = actual;
                }
            }
            Err(e) => tracing::warn!("Could not read installed rules, using tracked set: {}", e),
        }
    }

    async fn read_inputs(&self) -> std::result::Result<BlockingInputs, StoreError> {
        let store = self.store.as_ref();
        let session: Session = load(store, keys::SESSION).await?.unwrap_or_default();
        Ok(BlockingInputs {
            enabled: load(store, keys::ENABLED).await?.unwrap_or(true),
            block_list: load(store, keys::BLOCK_LIST).await?.unwrap_or_default(),
            whitelist: load(store, keys::WHITELIST).await?.unwrap_or_default(),
            allowances: load(store, keys::TEMPORARY_ALLOWANCES)
                .await?
                .unwrap_or_default(),
            session: session.state,
        })
    }

    async fn reconcile(&self, state: &mut EngineState, plan: RulePlan) {
        if state.needs_full_clear && !self.fail_safe_clear(state, &[], "retrying failed clear").await
        {
            return;
        }

        let installed_blocks: BTreeMap<u32, &InterceptRule> = state
            .installed
            .iter()
            .filter(|(_, r)| r.is_block())
            .map(|(id, r)| (*id, r))
            .collect();

        let to_remove: Vec<u32> = installed_blocks
            .iter()
            .filter(|(id, rule)| plan.rules.get(id) != Some(**rule))
            .map(|(id, _)| *id)
            .collect();
        let to_add: Vec<InterceptRule> = plan
            .rules
            .values()
            .filter(|rule| installed_blocks.get(&rule.id) != Some(rule))
            .cloned()
            .collect();

        if to_remove.is_empty() && to_add.is_empty() {
            tracing::trace!("Installed rules already match");
            return;
        }
        tracing::debug!(
            remove = to_remove.len(),
            add = to_add.len(),
            desired = plan.rules.len(),
            "Applying rule diff"
        );

        match self.apply_diff(&to_remove, &to_add).await {
            Ok(()) => {
                for id in &to_remove {
                    state.installed.remove(id);
                }
                state
                    .installed
                    .extend(to_add.iter().map(|r| (r.id, r.clone())));
                let installed = state.installed.values().filter(|r| r.is_block()).count();
                tracing::info!(installed, "Block rules updated");
                self.events.publish(Event::RulesApplied {
                    installed,
                    added: to_add.len(),
                    removed: to_remove.len(),
                    at: self.clock.now(),
                });
            }
            Err(e) => {
                tracing::warn!("Rule update failed, clearing all block rules: {}", e);
                self.fail_safe_clear(state, &to_add, &e.to_string()).await;
            }
        }
        self.persist_installed(state).await;
    }

    async fn apply_diff(
        &self,
        to_remove: &[u32],
        to_add: &[InterceptRule],
    ) -> std::result::Result<(), RuleApplyError> {
        if !to_remove.is_empty() {
            self.interceptor.remove_rules(to_remove).await?;
        }
        if !to_add.is_empty() {
            self.interceptor.add_rules(to_add).await?;
        }
        Ok(())
    }

    /// Remove every tracked block rule plus `attempted`. Returns true when the
    /// clear went through.
    async fn fail_safe_clear(
        &self,
        state: &mut EngineState,
        attempted: &[InterceptRule],
        reason: &str,
    ) -> bool {
        let mut ids: BTreeSet<u32> = state
            .installed
            .values()
            .filter(|r| r.is_block())
            .map(|r| r.id)
            .collect();
        ids.extend(attempted.iter().map(|r| r.id));
        let ids: Vec<u32> = ids.into_iter().collect();

        match self.interceptor.remove_rules(&ids).await {
            Ok(()) => {
                state.installed.retain(|_, r| !r.is_block());
                state.needs_full_clear = false;
                self.events.publish(Event::RulesCleared {
                    reason: reason.to_string(),
                    at: self.clock.now(),
                });
                true
            }
            Err(e) => {
                tracing::error!(count = ids.len(), "Fail-safe clear failed: {}", e);
                state
                    .installed
                    .extend(attempted.iter().map(|r| (r.id, r.clone())));
                state.needs_full_clear = true;
                false
            }
        }
    }

    async fn persist_installed(&self, state: &EngineState) {
        let ids: Vec<u32> = state.installed.keys().copied().collect();
        if let Err(e) = save(self.store.as_ref(), keys::INSTALLED_RULE_IDS, &ids).await {
            tracing::warn!("Could not persist installed rule ids: {}", e);
        }
    }

    /// Remove every block rule. Permanent allow rules stay.
    pub async fn clear_all(&self) -> std::result::Result<(), RuleApplyError> {
        let mut state = self.state.lock().await;
        self.sync_installed(&mut state).await;
        let ids: Vec<u32> = state
            .installed
            .values()
            .filter(|r| r.is_block())
            .map(|r| r.id)
            .collect();
        if !ids.is_empty() {
            self.interceptor.remove_rules(&ids).await?;
            state.installed.retain(|_, r| !r.is_block());
            tracing::info!(removed = ids.len(), "Cleared all block rules");
            self.events.publish(Event::RulesCleared {
                reason: "cleared on request".into(),
                at: self.clock.now(),
            });
        }
        state.needs_full_clear = false;
        self.persist_installed(&state).await;
        Ok(())
    }

    // ── Temporary allowances ─────────────────────────────────────────

    /// Unblock `site` for `minutes`, effective immediately.
    pub async fn allow_temporarily(&self, site: &str, minutes: u64) -> Result<TemporaryAllowance> {
        if minutes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "minutes".into(),
                message: "must be at least 1".into(),
            }
            .into());
        }
        let key = SitePattern::parse(site)?.key();
        let now = self.clock.now();
        let expires_at =
            allowance::expiry(now, minutes).ok_or_else(|| ValidationError::InvalidValue {
                field: "minutes".into(),
                message: format!("{minutes} is out of range"),
            })?;

        let mut list: Vec<TemporaryAllowance> =
            load(self.store.as_ref(), keys::TEMPORARY_ALLOWANCES)
                .await?
                .unwrap_or_default();
        allowance::upsert(&mut list, &key, expires_at);
        save(self.store.as_ref(), keys::TEMPORARY_ALLOWANCES, &list).await?;

        tracing::info!(site = %key, minutes, "Temporary allowance granted");
        self.events.publish(Event::AllowanceGranted {
            site: key.clone(),
            expires_at,
            at: now,
        });
        self.update_now().await;
        Ok(TemporaryAllowance {
            site: key,
            expires_at,
        })
    }

    /// Drop expired allowances and reconcile when any were removed.
    pub async fn sweep_allowances(&self) -> Vec<String> {
        match self.sweep_expired().await {
            Ok(expired) if !expired.is_empty() => {
                self.update_now().await;
                expired
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::warn!("Allowance sweep skipped: {}", e);
                Vec::new()
            }
        }
    }

    async fn sweep_expired(&self) -> std::result::Result<Vec<String>, StoreError> {
        let Some(mut list) =
            load::<Vec<TemporaryAllowance>>(self.store.as_ref(), keys::TEMPORARY_ALLOWANCES)
                .await?
        else {
            return Ok(Vec::new());
        };
        let now = self.clock.now();
        let expired = allowance::sweep(&mut list, now);
        if !expired.is_empty() {
            save(self.store.as_ref(), keys::TEMPORARY_ALLOWANCES, &list).await?;
            tracing::info!(sites = ?expired, "Temporary allowances expired");
            self.events.publish(Event::AllowancesExpired {
                sites: expired.clone(),
                at: now,
            });
        }
        Ok(expired)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn installed_rules(&self) -> Vec<InterceptRule> {
        let mut state = self.state.lock().await;
        self.sync_installed(&mut state).await;
        state.installed.values().cloned().collect()
    }

    /// Whether the installed rules redirect `url`.
    pub async fn is_blocked(&self, url: &str) -> bool {
        let mut state = self.state.lock().await;
        self.sync_installed(&mut state).await;
        evaluate(state.installed.values(), url).is_some_and(|r| r.is_block())
    }
}

/// Stand-in for an id we know is installed but whose rule we never saw.
/// Only its id and block action matter for the next clear.
fn orphan_placeholder(id: u32) -> InterceptRule {
    InterceptRule {
        id,
        priority: 1,
        action: crate::interceptor::RuleAction::Redirect {
            extension_path: String::new(),
        },
        condition: crate::interceptor::RuleCondition::regex("$^"),
    }
}

#[async_trait]
impl BlockingSignal for BlockingEngine {
    async fn session_changed(&self) {
        self.update_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::BlockListEntry;
    use crate::clock::ManualClock;
    use crate::events::EventBus;
    use crate::error::CoreError;
    use crate::interceptor::{FailOn, MemoryInterceptor};
    use crate::session::SessionKind;
    use crate::store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        interceptor: Arc<MemoryInterceptor>,
        clock: Arc<ManualClock>,
        engine: Arc<BlockingEngine>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let interceptor = Arc::new(MemoryInterceptor::new());
        let clock = Arc::new(ManualClock::starting_now());
        let engine = Arc::new(BlockingEngine::new(
            store.clone(),
            interceptor.clone(),
            clock.clone(),
            Arc::new(EventBus::default()),
            EngineOptions {
                default_block_list: Vec::new(),
                ..EngineOptions::default()
            },
        ));
        Harness {
            store,
            interceptor,
            clock,
            engine,
        }
    }

    async fn set_focus(h: &Harness) {
        let session = Session::running(SessionKind::Focus, 1500, h.clock.now());
        save(h.store.as_ref(), keys::SESSION, &session).await.unwrap();
    }

    async fn block(h: &Harness, sites: &[&str]) {
        let list: Vec<BlockListEntry> = sites.iter().map(|s| BlockListEntry::active(*s)).collect();
        save(h.store.as_ref(), keys::BLOCK_LIST, &list).await.unwrap();
    }

    #[tokio::test]
    async fn initialization_installs_allow_rules_and_removes_orphans() {
        let h = harness();
        save(h.store.as_ref(), keys::INSTALLED_RULE_IDS, &vec![4242u32])
            .await
            .unwrap();
        assert_eq!(h.engine.phase(), EnginePhase::Uninitialized);
        h.engine.initialize().await;
        assert_eq!(h.engine.phase(), EnginePhase::Active);

        let rules = h.interceptor.rules();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| !r.is_block()));
        let ids: Vec<u32> = load(h.store.as_ref(), keys::INSTALLED_RULE_IDS)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn defaults_are_seeded_once() {
        let store = Arc::new(MemoryStore::new());
        let engine = BlockingEngine::new(
            store.clone(),
            Arc::new(MemoryInterceptor::new()),
            Arc::new(ManualClock::starting_now()),
            Arc::new(EventBus::default()),
            EngineOptions::default(),
        );
        engine.initialize().await;
        let list: Vec<BlockListEntry> = load(store.as_ref(), keys::BLOCK_LIST)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(list.len(), 5);
        assert!(list.iter().any(|e| e.pattern == "youtube.com"));
    }

    #[tokio::test]
    async fn focus_installs_block_rules_and_update_is_idempotent() {
        let h = harness();
        block(&h, &["x.com", "reddit.com"]).await;
        set_focus(&h).await;
        h.engine.update_now().await;
        assert_eq!(h.interceptor.block_rules().len(), 2);
        assert!(h.engine.is_blocked("https://www.reddit.com/r/rust").await);
        assert!(!h.engine.is_blocked("http://localhost:3000/").await);

        let calls = h.interceptor.call_count();
        h.engine.update_now().await;
        assert_eq!(h.interceptor.call_count(), calls);
        assert_eq!(h.interceptor.block_rules().len(), 2);
    }

    #[tokio::test]
    async fn add_failure_clears_every_block_rule() {
        let h = harness();
        block(&h, &["x.com"]).await;
        set_focus(&h).await;
        h.engine.update_now().await;
        assert_eq!(h.interceptor.block_rules().len(), 1);

        block(&h, &["x.com", "y.com"]).await;
        h.interceptor.fail_next(FailOn::Add);
        h.engine.update_now().await;
        assert!(h.interceptor.block_rules().is_empty());
        assert!(h
            .engine
            .installed_rules()
            .await
            .iter()
            .all(|r| !r.is_block()));

        h.engine.update_now().await;
        assert_eq!(h.interceptor.block_rules().len(), 2);
    }

    #[tokio::test]
    async fn failed_clear_is_retried_before_next_plan() {
        let h = harness();
        block(&h, &["x.com"]).await;
        set_focus(&h).await;
        h.engine.update_now().await;

        block(&h, &["y.com"]).await;
        h.interceptor.fail_next(FailOn::Remove);
        h.interceptor.fail_next(FailOn::Remove);
        h.engine.update_now().await;
        assert_eq!(h.interceptor.block_rules().len(), 1);

        h.engine.update_now().await;
        let blocks = h.interceptor.block_rules();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].condition.url_filter.as_deref(), Some("||y.com^"));
    }

    #[tokio::test]
    async fn unreadable_store_plans_unblocked() {
        let h = harness();
        block(&h, &["x.com"]).await;
        set_focus(&h).await;
        h.engine.update_now().await;
        assert_eq!(h.interceptor.block_rules().len(), 1);

        h.store.set_offline(true);
        h.engine.update_now().await;
        assert!(h.interceptor.block_rules().is_empty());
    }

    #[tokio::test]
    async fn allowance_unblocks_until_swept() {
        let h = harness();
        block(&h, &["x.com"]).await;
        set_focus(&h).await;
        h.engine.update_now().await;

        let grant = h.engine.allow_temporarily("https://x.com/feed", 5).await.unwrap();
        assert_eq!(grant.site, "x.com");
        assert!(h.interceptor.block_rules().is_empty());

        h.clock.advance(chrono::Duration::minutes(4));
        assert!(h.engine.sweep_allowances().await.is_empty());
        assert!(h.interceptor.block_rules().is_empty());

        h.clock.advance(chrono::Duration::minutes(1));
        assert_eq!(h.engine.sweep_allowances().await, vec!["x.com"]);
        assert_eq!(h.interceptor.block_rules().len(), 1);
    }

    #[tokio::test]
    async fn allowance_rejects_zero_minutes_and_bad_site() {
        let h = harness();
        assert!(h.engine.allow_temporarily("x.com", 0).await.is_err());
        assert!(h.engine.allow_temporarily("nonsense", 5).await.is_err());
        assert!(matches!(
            h.engine.allow_temporarily("x.com", u64::MAX).await,
            Err(CoreError::Validation(ValidationError::InvalidValue { .. }))
        ));
    }

    #[tokio::test]
    async fn clear_all_keeps_allow_rules() {
        let h = harness();
        block(&h, &["x.com"]).await;
        set_focus(&h).await;
        h.engine.update_now().await;
        h.engine.clear_all().await.unwrap();
        assert!(h.interceptor.block_rules().is_empty());
        assert_eq!(h.interceptor.rules().len(), 2);
    }

    #[tokio::test]
    async fn clear_all_removes_rules_installed_by_another_engine() {
        let h = harness();
        h.engine.initialize().await;

        // A second engine over the same store and interceptor, as a second
        // process would have.
        let other = BlockingEngine::new(
            h.store.clone(),
            h.interceptor.clone(),
            h.clock.clone(),
            Arc::new(EventBus::default()),
            EngineOptions {
                default_block_list: Vec::new(),
                ..EngineOptions::default()
            },
        );
        other.initialize().await;
        block(&h, &["x.com", "y.com"]).await;
        set_focus(&h).await;
        other.update_now().await;
        assert_eq!(h.interceptor.block_rules().len(), 2);

        assert!(h.engine.is_blocked("https://x.com/").await);
        h.engine.clear_all().await.unwrap();
        assert!(h.interceptor.block_rules().is_empty());
        assert_eq!(h.interceptor.rules().len(), 2);
    }

    #[tokio::test]
    async fn reconcile_adopts_rules_changed_elsewhere() {
        let h = harness();
        block(&h, &["x.com"]).await;
        set_focus(&h).await;
        h.engine.update_now().await;

        // Someone else removed our rule; the next run puts it back.
        let id = h.interceptor.block_rules()[0].id;
        h.interceptor.remove_rules(&[id]).await.unwrap();
        h.engine.update_now().await;
        assert_eq!(h.interceptor.block_rules().len(), 1);

        let calls = h.interceptor.call_count();
        h.engine.update_now().await;
        assert_eq!(h.interceptor.call_count(), calls);
    }

    #[tokio::test]
    async fn default_ceiling_fits_alongside_allow_rules() {
        let h = harness();
        let sites: Vec<String> = (0..5_100).map(|i| format!("site{i}.com")).collect();
        let list: Vec<BlockListEntry> = sites.iter().map(|s| BlockListEntry::active(s)).collect();
        save(h.store.as_ref(), keys::BLOCK_LIST, &list).await.unwrap();
        set_focus(&h).await;

        h.engine.update_now().await;
        assert_eq!(h.interceptor.block_rules().len(), 5_000);
        assert_eq!(h.interceptor.rules().len(), 5_002);
        assert!(h.engine.is_blocked("https://site0.com/").await);
        assert!(!h.engine.is_blocked("https://site5099.com/").await);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_updates_coalesces() {
        let h = harness();
        block(&h, &["x.com"]).await;
        set_focus(&h).await;
        h.engine.update_now().await;
        let calls = h.interceptor.call_count();

        block(&h, &["x.com", "y.com"]).await;
        let a = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.update().await })
        };
        block(&h, &["x.com", "y.com", "z.com"]).await;
        let b = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.update().await })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(h.interceptor.block_rules().len(), 3);
        // One remove-free add for the coalesced run.
        assert_eq!(h.interceptor.call_count(), calls + 1);
    }
}
