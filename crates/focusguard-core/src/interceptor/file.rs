//! Rule table persisted as JSON.
//!
//! Lets the CLI act as the interception backend: the installed rules live in
//! `rules.json` next to the database, where a proxy or browser bridge can
//! pick them up.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{add_checked, InterceptRule, NetworkInterceptor, DEFAULT_RULE_LIMIT};
use crate::error::RuleApplyError;

pub struct RuleFileInterceptor {
    path: PathBuf,
    limit: usize,
    // Serializes read-modify-write cycles within this process.
    guard: Mutex<()>,
}

impl RuleFileInterceptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: DEFAULT_RULE_LIMIT + 100,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, operation: &'static str) -> Result<BTreeMap<u32, InterceptRule>, RuleApplyError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(rejected(operation, e)),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let rules: Vec<InterceptRule> =
            serde_json::from_str(&content).map_err(|e| rejected(operation, e))?;
        Ok(rules.into_iter().map(|r| (r.id, r)).collect())
    }

    fn write(
        &self,
        operation: &'static str,
        rules: &BTreeMap<u32, InterceptRule>,
    ) -> Result<(), RuleApplyError> {
        let list: Vec<&InterceptRule> = rules.values().collect();
        let content = serde_json::to_string_pretty(&list).map_err(|e| rejected(operation, e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| rejected(operation, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| rejected(operation, e))
    }
}

fn rejected(operation: &'static str, err: impl std::fmt::Display) -> RuleApplyError {
    RuleApplyError::Rejected {
        operation,
        message: err.to_string(),
    }
}

#[async_trait]
impl NetworkInterceptor for RuleFileInterceptor {
    async fn remove_rules(&self, ids: &[u32]) -> Result<(), RuleApplyError> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut rules = self.read("remove")?;
        for id in ids {
            rules.remove(id);
        }
        self.write("remove", &rules)
    }

    async fn add_rules(&self, rules: &[InterceptRule]) -> Result<(), RuleApplyError> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut installed = self.read("add")?;
        add_checked(&mut installed, rules, self.limit)?;
        self.write("add", &installed)
    }

    async fn installed(&self) -> Result<Vec<InterceptRule>, RuleApplyError> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read("read")?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::{RuleAction, RuleCondition};

    fn block(id: u32, host: &str) -> InterceptRule {
        InterceptRule {
            id,
            priority: 1,
            action: RuleAction::Redirect {
                extension_path: "/blocked.html".into(),
            },
            condition: RuleCondition::domain(host),
        }
    }

    #[tokio::test]
    async fn rules_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let interceptor = RuleFileInterceptor::new(&path);
        assert!(interceptor.installed().await.unwrap().is_empty());
        interceptor
            .add_rules(&[block(1000, "x.com"), block(1001, "y.com")])
            .await
            .unwrap();

        let reopened = RuleFileInterceptor::new(&path);
        assert_eq!(reopened.installed().await.unwrap().len(), 2);
        reopened.remove_rules(&[1000]).await.unwrap();
        assert_eq!(interceptor.installed().await.unwrap(), vec![block(1001, "y.com")]);
    }

    #[tokio::test]
    async fn duplicate_add_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let interceptor = RuleFileInterceptor::new(dir.path().join("rules.json"));
        interceptor.add_rules(&[block(1, "x.com")]).await.unwrap();
        assert!(interceptor.add_rules(&[block(1, "y.com")]).await.is_err());
        assert_eq!(interceptor.installed().await.unwrap(), vec![block(1, "x.com")]);
    }
}
