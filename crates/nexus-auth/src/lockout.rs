//! Credential attempt lockout: a rolling window of failed attempts per
//! client key (normally `email` or `email+ip`), locking out once a
//! threshold is hit within the window.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nexus_core::LockoutConfig;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct AttemptLog {
    failures: Vec<DateTime<Utc>>,
}

/// Tracks failed login attempts per client key and decides whether a new
/// attempt is allowed. Purely in-memory: a restart clears lockouts rather
/// than consulting a persisted ban list.
#[derive(Clone, Default)]
pub struct CredentialAttemptLog {
    attempts: Arc<DashMap<String, AttemptLog>>,
}

impl CredentialAttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if not locked out; `Some(retry_after)` otherwise.
    pub fn check(&self, key: &str, config: &LockoutConfig, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let window = chrono::Duration::seconds(config.window_secs as i64);
        let Some(mut entry) = self.attempts.get_mut(key) else {
            return None;
        };
        entry.failures.retain(|t| now.signed_duration_since(*t) < window);
        if entry.failures.len() as u32 >= config.max_failures {
            let oldest = *entry.failures.first().expect("non-empty by len check");
            let retry_after = window - now.signed_duration_since(oldest);
            return Some(retry_after.max(chrono::Duration::zero()));
        }
        None
    }

    pub fn record_failure(&self, key: &str, now: DateTime<Utc>) {
        self.attempts.entry(key.to_string()).or_default().failures.push(now);
    }

    pub fn clear(&self, key: &str) {
        self.attempts.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_attempts_under_threshold() {
        let log = CredentialAttemptLog::new();
        let config = LockoutConfig { max_failures: 5, window_secs: 900 };
        let now = Utc::now();
        for _ in 0..4 {
            log.record_failure("alice@example.com", now);
        }
        assert!(log.check("alice@example.com", &config, now).is_none());
    }

    #[test]
    fn locks_out_after_threshold() {
        let log = CredentialAttemptLog::new();
        let config = LockoutConfig { max_failures: 5, window_secs: 900 };
        let now = Utc::now();
        for _ in 0..5 {
            log.record_failure("alice@example.com", now);
        }
        assert!(log.check("alice@example.com", &config, now).is_some());
    }

    #[test]
    fn old_failures_age_out_of_window() {
        let log = CredentialAttemptLog::new();
        let config = LockoutConfig { max_failures: 5, window_secs: 900 };
        let old = Utc::now() - chrono::Duration::seconds(1000);
        for _ in 0..5 {
            log.record_failure("alice@example.com", old);
        }
        assert!(log.check("alice@example.com", &config, Utc::now()).is_none());
    }

    #[test]
    fn clear_resets_lockout() {
        let log = CredentialAttemptLog::new();
        let config = LockoutConfig { max_failures: 5, window_secs: 900 };
        let now = Utc::now();
        for _ in 0..5 {
            log.record_failure("alice@example.com", now);
        }
        log.clear("alice@example.com");
        assert!(log.check("alice@example.com", &config, now).is_none());
    }
}
