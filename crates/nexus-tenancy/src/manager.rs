//! Tenancy manager: organization and team lifecycle, membership, and plan
//! changes. Quota consumption itself lives in `nexus-quota`; this crate
//! only owns the org/team shape and who belongs to what.

use nexus_core::{
    ids, NexusError, NexusResult, Organization, PlanType, QuotaResource, Store, Team, TeamId,
    UserId,
};
use std::sync::Arc;

const ORG_PREFIX: &str = "org:";
const TEAM_PREFIX: &str = "team:";

pub struct TenancyManager {
    store: Arc<dyn Store>,
}

impl TenancyManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn org_key(org_id: &str) -> String {
        format!("{ORG_PREFIX}{org_id}")
    }

    fn team_key(team_id: &str) -> String {
        format!("{TEAM_PREFIX}{team_id}")
    }

    pub async fn create_organization(
        &self,
        name: &str,
        domain: &str,
        plan_type: PlanType,
        owner_user_id: UserId,
        billing_email: &str,
    ) -> NexusResult<Organization> {
        let org_id = ids::new_id("org");
        let org = Organization::new(org_id, name, domain, plan_type, owner_user_id, billing_email);
        self.put_org(&org).await?;
        Ok(org)
    }

    async fn put_org(&self, org: &Organization) -> NexusResult<()> {
        let bytes = serde_json::to_vec(org)
            .map_err(|e| NexusError::internal(format!("failed to encode org: {e}")))?;
        self.store.put(&Self::org_key(&org.org_id), bytes).await
    }

    pub async fn get_organization(&self, org_id: &str) -> NexusResult<Organization> {
        let bytes = self
            .store
            .get(&Self::org_key(org_id))
            .await?
            .ok_or_else(|| NexusError::not_found(format!("organization {org_id}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| NexusError::internal(format!("corrupt organization record: {e}")))
    }

    /// Atomically replaces the plan's quota limits while preserving usage
    /// counters. Immediate effect, no grace period — see
    /// DESIGN.md's Open Question decisions.
    pub async fn set_plan(&self, org_id: &str, plan_type: PlanType) -> NexusResult<Organization> {
        let mut org = self.get_organization(org_id).await?;
        org.set_plan(plan_type);
        self.put_org(&org).await?;
        Ok(org)
    }

    pub async fn create_team(
        &self,
        org_id: &str,
        name: &str,
        lead_user_id: UserId,
    ) -> NexusResult<Team> {
        // Confirms the org exists before creating a team under it.
        self.get_organization(org_id).await?;
        let team_id = ids::new_id("team");
        let team = Team::new(team_id, org_id.to_string(), name, lead_user_id);
        self.put_team(&team).await?;
        Ok(team)
    }

    async fn put_team(&self, team: &Team) -> NexusResult<()> {
        let bytes = serde_json::to_vec(team)
            .map_err(|e| NexusError::internal(format!("failed to encode team: {e}")))?;
        self.store.put(&Self::team_key(&team.team_id), bytes).await
    }

    pub async fn get_team(&self, team_id: &str) -> NexusResult<Team> {
        let bytes = self
            .store
            .get(&Self::team_key(team_id))
            .await?
            .ok_or_else(|| NexusError::not_found(format!("team {team_id}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| NexusError::internal(format!("corrupt team record: {e}")))
    }

    pub async fn list_teams_for_org(&self, org_id: &str) -> NexusResult<Vec<Team>> {
        let mut teams = Vec::new();
        for (_, bytes) in self.store.scan(TEAM_PREFIX).await? {
            if let Ok(team) = serde_json::from_slice::<Team>(&bytes) {
                if team.org_id == org_id {
                    teams.push(team);
                }
            }
        }
        Ok(teams)
    }

    pub async fn add_member(&self, team_id: &TeamId, user_id: UserId) -> NexusResult<Team> {
        let mut team = self.get_team(team_id).await?;
        if !team.members.contains(&user_id) {
            team.members.push(user_id);
        }
        self.put_team(&team).await?;
        Ok(team)
    }

    /// Fails rather than silently orphaning the team if asked to remove
    /// its lead (invariant: lead must remain a member).
    pub async fn remove_member(&self, team_id: &TeamId, user_id: &str) -> NexusResult<Team> {
        let mut team = self.get_team(team_id).await?;
        if team.lead_user_id == user_id {
            return Err(NexusError::InvalidInput(
                "cannot remove the team lead; reassign leadership first".into(),
            ));
        }
        team.members.retain(|m| m != user_id);
        self.put_team(&team).await?;
        Ok(team)
    }

    pub fn quota_limit(org: &Organization, resource: QuotaResource) -> Option<u64> {
        org.quotas.get(&resource).copied()
    }

    /// Adjusts a point-in-time usage counter by `delta` (negative on
    /// release) and persists the result. Saturates at zero; never goes
    /// negative even if release calls outpace consume calls.
    pub async fn adjust_usage(
        &self,
        org_id: &str,
        resource: QuotaResource,
        delta: i64,
    ) -> NexusResult<Organization> {
        let mut org = self.get_organization(org_id).await?;
        let current = org.usage.get(&resource).copied().unwrap_or(0) as i64;
        let updated = (current + delta).max(0) as u64;
        org.usage.insert(resource, updated);
        self.put_org(&org).await?;
        Ok(org)
    }

    /// Summary counts used by admin tooling.
    pub async fn tenant_summary(&self, org_id: &str) -> NexusResult<TenantSummary> {
        let org = self.get_organization(org_id).await?;
        let teams = self.list_teams_for_org(org_id).await?;
        let member_count: usize = teams.iter().map(|t| t.members.len()).sum();
        Ok(TenantSummary {
            org_id: org.org_id.clone(),
            plan_type: org.plan_type,
            team_count: teams.len(),
            member_count,
            active: org.active,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TenantSummary {
    pub org_id: String,
    pub plan_type: PlanType,
    pub team_count: usize,
    pub member_count: usize,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::MemoryStore;

    fn manager() -> TenancyManager {
        TenancyManager::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn create_org_then_team_then_members() {
        let mgr = manager();
        let org = mgr
            .create_organization("Acme", "acme.com", PlanType::Starter, "user_1".into(), "billing@acme.com")
            .await
            .unwrap();
        let team = mgr.create_team(&org.org_id, "Platform", "user_1".into()).await.unwrap();
        assert!(team.is_valid());

        let team = mgr.add_member(&team.team_id, "user_2".into()).await.unwrap();
        assert_eq!(team.members.len(), 2);

        let summary = mgr.tenant_summary(&org.org_id).await.unwrap();
        assert_eq!(summary.team_count, 1);
        assert_eq!(summary.member_count, 2);
    }

    #[tokio::test]
    async fn cannot_remove_team_lead() {
        let mgr = manager();
        let org = mgr
            .create_organization("Acme", "acme.com", PlanType::Starter, "user_1".into(), "billing@acme.com")
            .await
            .unwrap();
        let team = mgr.create_team(&org.org_id, "Platform", "user_1".into()).await.unwrap();
        let err = mgr.remove_member(&team.team_id, "user_1").await.unwrap_err();
        assert!(matches!(err, NexusError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn set_plan_preserves_usage_through_manager() {
        let mgr = manager();
        let org = mgr
            .create_organization("Acme", "acme.com", PlanType::Starter, "user_1".into(), "billing@acme.com")
            .await
            .unwrap();
        let mut refreshed = mgr.get_organization(&org.org_id).await.unwrap();
        refreshed.usage.insert(nexus_core::QuotaResource::TeamMembers, 3);
        mgr.put_org(&refreshed).await.unwrap();

        let updated = mgr.set_plan(&org.org_id, PlanType::Professional).await.unwrap();
        assert_eq!(updated.quotas[&nexus_core::QuotaResource::TeamMembers], 25);
        assert_eq!(updated.usage[&nexus_core::QuotaResource::TeamMembers], 3);
    }

    #[tokio::test]
    async fn create_team_requires_existing_org() {
        let mgr = manager();
        let err = mgr.create_team("no-such-org", "Team", "user_1".into()).await.unwrap_err();
        assert!(matches!(err, NexusError::NotFound(_)));
    }
}
