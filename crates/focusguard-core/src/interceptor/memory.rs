use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{add_checked, InterceptRule, NetworkInterceptor, DEFAULT_RULE_LIMIT};
use crate::error::RuleApplyError;

/// Which call an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Remove,
    Add,
}

/// In-process rule table with the same add/remove semantics as a real
/// dynamic-rule API. Failures can be injected to exercise rollback paths.
pub struct MemoryInterceptor {
    rules: Mutex<BTreeMap<u32, InterceptRule>>,
    limit: usize,
    failures: Mutex<Vec<FailOn>>,
    remove_calls: AtomicUsize,
    add_calls: AtomicUsize,
}

impl MemoryInterceptor {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_RULE_LIMIT + 100)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            rules: Mutex::new(BTreeMap::new()),
            limit,
            failures: Mutex::new(Vec::new()),
            remove_calls: AtomicUsize::new(0),
            add_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next call of the given kind once.
    pub fn fail_next(&self, on: FailOn) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(on);
    }

    /// Snapshot of the installed rules ordered by id.
    pub fn rules(&self) -> Vec<InterceptRule> {
        let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        rules.values().cloned().collect()
    }

    /// Installed redirect rules only.
    pub fn block_rules(&self) -> Vec<InterceptRule> {
        self.rules().into_iter().filter(|r| r.is_block()).collect()
    }

    /// Total number of remove + add calls received.
    pub fn call_count(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst) + self.add_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, on: FailOn, operation: &'static str) -> Result<(), RuleApplyError> {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = failures.iter().position(|f| *f == on) {
            failures.remove(pos);
            return Err(RuleApplyError::Rejected {
                operation,
                message: "injected failure".into(),
            });
        }
        Ok(())
    }
}

impl Default for MemoryInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkInterceptor for MemoryInterceptor {
    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleApplyError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure(FailOn::Remove, "remove")?;
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        for id in ids {
            rules.remove(id);
        }
        Ok(())
    }

    async fn add_rules(&self, rules: &[InterceptRule]) -> Result<(), RuleApplyError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure(FailOn::Add, "add")?;
        let mut installed = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        add_checked(&mut installed, rules, self.limit)
    }

    async fn installed(&self) -> Result<Vec<InterceptRule>, RuleApplyError> {
        Ok(self.rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::{RuleAction, RuleCondition};

    fn allow(id: u32) -> InterceptRule {
        InterceptRule {
            id,
            priority: 2,
            action: RuleAction::Allow,
            condition: RuleCondition::domain("localhost"),
        }
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let interceptor = MemoryInterceptor::new();
        interceptor.fail_next(FailOn::Add);
        assert!(interceptor.add_rules(&[allow(1)]).await.is_err());
        assert!(interceptor.add_rules(&[allow(1)]).await.is_ok());
        assert_eq!(interceptor.rules().len(), 1);
        assert!(interceptor.block_rules().is_empty());
        assert_eq!(interceptor.call_count(), 2);
    }

    #[tokio::test]
    async fn remove_ignores_unknown_ids() {
        let interceptor = MemoryInterceptor::new();
        interceptor.add_rules(&[allow(1)]).await.unwrap();
        interceptor.remove_rules(&[1, 99]).await.unwrap();
        assert!(interceptor.rules().is_empty());
    }
}
