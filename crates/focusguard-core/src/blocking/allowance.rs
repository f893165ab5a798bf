//! Time-boxed exceptions to the block list.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryAllowance {
    /// Canonical pattern key.
    pub site: String,
    pub expires_at: DateTime<Utc>,
}

impl TemporaryAllowance {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Expiry `minutes` from `now`, or None when it is not representable.
pub fn expiry(now: DateTime<Utc>, minutes: u64) -> Option<DateTime<Utc>> {
    let minutes = i64::try_from(minutes).ok()?;
    now.checked_add_signed(Duration::try_minutes(minutes)?)
}

/// Insert or replace the allowance for `site`. The later grant wins even if
/// it expires sooner.
pub fn upsert(allowances: &mut Vec<TemporaryAllowance>, site: &str, expires_at: DateTime<Utc>) {
    allowances.retain(|a| a.site != site);
    allowances.push(TemporaryAllowance {
        site: site.to_string(),
        expires_at,
    });
}

/// Drop expired entries, returning the sites that were removed.
pub fn sweep(allowances: &mut Vec<TemporaryAllowance>, now: DateTime<Utc>) -> Vec<String> {
    let mut expired = Vec::new();
    allowances.retain(|a| {
        if a.is_expired(now) {
            expired.push(a.site.clone());
            false
        } else {
            true
        }
    });
    expired
}

pub fn is_allowed(allowances: &[TemporaryAllowance], site: &str, now: DateTime<Utc>) -> bool {
    allowances
        .iter()
        .any(|a| a.site == site && !a.is_expired(now))
}
