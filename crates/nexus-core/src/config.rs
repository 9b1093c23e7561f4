//! Process-wide configuration. Loaded once at startup: compiled-in
//! defaults, overlaid by an optional YAML file, overlaid by environment
//! variables. `rollout_rules` is the one setting explicitly marked
//! hot-reloadable (it lives behind an `ArcSwap` in `nexus-flags`, not here).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{NexusError, NexusResult};
use crate::org::PlanType;
use crate::quota::{QuotaMap, QuotaResource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_upper: bool,
    pub require_lower: bool,
    pub require_digit: bool,
    pub require_special: bool,
    #[serde(default = "default_deny_list")]
    pub deny_list: Vec<String>,
}

fn default_deny_list() -> Vec<String> {
    vec!["password".into(), "12345678".into(), "qwertyui".into()]
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_upper: true,
            require_lower: true,
            require_digit: true,
            require_special: true,
            deny_list: default_deny_list(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockoutConfig {
    pub max_failures: u32,
    pub window_secs: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutRule {
    pub feature: String,
    pub percentage: u8,
    pub target_plan: Option<PlanType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NexusConfig {
    pub token_signing_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default)]
    pub password_policy: PasswordPolicy,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default = "default_plan_quotas")]
    pub default_plan_quotas: HashMap<PlanKey, QuotaMap>,
    #[serde(default = "default_session_idle_ttl")]
    pub session_idle_ttl_secs: u64,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default)]
    pub rollout_rules: Vec<RolloutRule>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Whether a refresh token is invalidated on use (rotation) or remains
    /// valid until expiry (reusable). See DESIGN.md's Open Question.
    #[serde(default = "default_true")]
    pub rotate_refresh_tokens: bool,
    /// Whether MFA is enforced on login for enrolled users, or only
    /// available as an enrollment hook.
    #[serde(default)]
    pub enforce_mfa: bool,
}

fn default_true() -> bool {
    true
}
fn default_access_ttl() -> u64 {
    3600
}
fn default_refresh_ttl() -> u64 {
    24 * 3600
}
fn default_session_idle_ttl() -> u64 {
    24 * 3600
}
fn default_history_cap() -> usize {
    50
}
fn default_request_timeout() -> u64 {
    30
}

/// `HashMap` keys must be hashable + serde-friendly; `PlanType` already is,
/// but serde_yaml maps need string-ish keys, so this thin wrapper just
/// re-exports `PlanType` under a name that reads naturally as a map key.
pub type PlanKey = PlanType;

fn default_plan_quotas() -> HashMap<PlanKey, QuotaMap> {
    let mut map = HashMap::new();
    for plan in [PlanType::Starter, PlanType::Professional, PlanType::Enterprise] {
        map.insert(plan, plan.default_quotas());
    }
    map.insert(PlanType::Custom, QuotaMap::new());
    map
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self {
            token_signing_secret: "dev-only-signing-secret-change-me".to_string(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            password_policy: PasswordPolicy::default(),
            lockout: LockoutConfig::default(),
            default_plan_quotas: default_plan_quotas(),
            session_idle_ttl_secs: default_session_idle_ttl(),
            history_cap: default_history_cap(),
            rollout_rules: Vec::new(),
            request_timeout_secs: default_request_timeout(),
            rotate_refresh_tokens: true,
            enforce_mfa: false,
        }
    }
}

impl NexusConfig {
    /// Loads defaults, overlays an optional YAML file, then overlays
    /// environment variables for the handful of settings that commonly
    /// need per-deployment overrides without editing the file.
    pub fn load(path: Option<&Path>) -> NexusResult<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| NexusError::internal(format!("failed to read config: {e}")))?;
                config = serde_yaml::from_str(&raw)
                    .map_err(|e| NexusError::internal(format!("failed to parse config: {e}")))?;
            }
        }

        if let Ok(secret) = std::env::var("NEXUS_TOKEN_SIGNING_SECRET") {
            config.token_signing_secret = crate::envutil::expand_env_vars(&secret);
        }
        if let Ok(v) = std::env::var("NEXUS_ACCESS_TOKEN_TTL_SECS") {
            if let Ok(n) = v.parse() {
                config.access_token_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("NEXUS_REFRESH_TOKEN_TTL_SECS") {
            if let Ok(n) = v.parse() {
                config.refresh_token_ttl_secs = n;
            }
        }

        Ok(config)
    }

    pub fn quotas_for(&self, plan: PlanType) -> QuotaMap {
        self.default_plan_quotas
            .get(&plan)
            .cloned()
            .unwrap_or_default()
    }
}
