//! Organization and Team data model, plus the plan -> quota binding
//! table with concrete default quota magnitudes per plan tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{OrgId, TeamId, UserId};
use crate::quota::{QuotaMap, QuotaResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Starter,
    Professional,
    Enterprise,
    Custom,
}

impl PlanType {
    /// Default quota bundle for this plan. `Custom` has no built-in
    /// defaults — callers must supply quotas explicitly at org creation.
    pub fn default_quotas(self) -> QuotaMap {
        use QuotaResource::*;
        let pairs: &[(QuotaResource, u64)] = match self {
            PlanType::Starter => &[
                (AgentsPerMonth, 1000),
                (WorkflowsPerMonth, 50),
                (StorageGb, 5),
                (ApiCallsPerHour, 100),
                (TeamMembers, 5),
                (ConcurrentWorkflows, 2),
            ],
            PlanType::Professional => &[
                (AgentsPerMonth, 10_000),
                (WorkflowsPerMonth, 500),
                (StorageGb, 50),
                (ApiCallsPerHour, 1000),
                (TeamMembers, 25),
                (ConcurrentWorkflows, 5),
            ],
            PlanType::Enterprise => &[
                (AgentsPerMonth, 100_000),
                (WorkflowsPerMonth, 5000),
                (StorageGb, 500),
                (ApiCallsPerHour, 10_000),
                (TeamMembers, 100),
                (ConcurrentWorkflows, 20),
            ],
            PlanType::Custom => &[],
        };
        pairs.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub org_id: OrgId,
    pub name: String,
    pub domain: String,
    pub plan_type: PlanType,
    pub billing_email: String,
    pub owner_user_id: UserId,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
    pub quotas: QuotaMap,
    /// Live counters for point-in-time resources; sliding-window resources
    /// are tracked separately by the quota engine's timestamp queues and
    /// are not mirrored here.
    #[serde(default)]
    pub usage: QuotaMap,
}

impl Organization {
    pub fn new(
        org_id: OrgId,
        name: impl Into<String>,
        domain: impl Into<String>,
        plan_type: PlanType,
        owner_user_id: UserId,
        billing_email: impl Into<String>,
    ) -> Self {
        let quotas = plan_type.default_quotas();
        let usage = quotas.keys().map(|r| (*r, 0)).collect();
        let mut settings = HashMap::new();
        settings.insert("timezone".to_string(), serde_json::json!("UTC"));
        settings.insert("enable_audit_logs".to_string(), serde_json::json!(true));
        settings.insert("data_retention_days".to_string(), serde_json::json!(90));
        settings.insert(
            "enable_sso".to_string(),
            serde_json::json!(matches!(plan_type, PlanType::Enterprise | PlanType::Custom)),
        );
        Self {
            org_id,
            name: name.into(),
            domain: domain.into(),
            plan_type,
            billing_email: billing_email.into(),
            owner_user_id,
            active: true,
            created_at: Utc::now(),
            settings,
            quotas,
            usage,
        }
    }

    /// Replaces the quota limits in place while preserving usage counters
    /// ("atomically replaces the quota limits but preserves current
    /// usage counters"). If the new limits make `usage > quotas` for some
    /// resource, that is left as-is: future `check_and_consume` calls fail
    /// until the window rolls over or an admin resets counters.
    pub fn set_plan(&mut self, plan_type: PlanType) {
        self.plan_type = plan_type;
        self.quotas = plan_type.default_quotas();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub team_id: TeamId,
    pub org_id: OrgId,
    pub name: String,
    pub lead_user_id: UserId,
    pub members: Vec<UserId>,
    pub permissions: HashMap<String, bool>,
}

impl Team {
    pub fn new(team_id: TeamId, org_id: OrgId, name: impl Into<String>, lead_user_id: UserId) -> Self {
        let mut permissions = HashMap::new();
        permissions.insert("can_create_workflows".to_string(), true);
        permissions.insert("can_view_org_analytics".to_string(), false);
        permissions.insert("can_manage_team".to_string(), true);
        permissions.insert("can_access_all_agents".to_string(), true);
        Self {
            team_id,
            org_id,
            name: name.into(),
            members: vec![lead_user_id.clone()],
            lead_user_id,
            permissions,
        }
    }

    /// Invariant: `lead_user_id` must be a member.
    pub fn is_valid(&self) -> bool {
        self.members.contains(&self.lead_user_id)
    }
}
