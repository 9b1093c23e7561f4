//! Composed application state and the `get_tenant_context` operation.
//!
//! `TenancyManager` only ever operates on an `org_id` directly — it has no
//! access to user records, which live in `nexus-auth`'s identity store. The
//! spec's `get_tenant_context(user_id) -> {org, teams, roles, permissions,
//! preferences}` therefore doesn't live as a single method on any one
//! component; it's composed here, at the request shell, out of
//! `AuthService::get_user` + `TenancyManager::get_organization` +
//! `TenancyManager::list_teams_for_org` + `nexus_auth::permissions_for_roles`.

use nexus_auth::{permissions_for_roles, AuthService};
use nexus_core::{NexusConfig, NexusResult, Organization, Store, Team};
use nexus_flags::{FlagRegistry, OnboardingTracker};
use nexus_quota::QuotaEngine;
use nexus_runtime::{AgentRegistry, Dispatcher, WorkflowEngine};
use nexus_session::SessionStore;
use nexus_tenancy::TenancyManager;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AppContext {
    pub config: NexusConfig,
    pub auth: AuthService,
    pub tenancy: Arc<TenancyManager>,
    pub quota: Arc<QuotaEngine>,
    pub sessions: Arc<SessionStore>,
    pub agents: Arc<AgentRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub workflows: Arc<WorkflowEngine>,
    pub flags: Arc<FlagRegistry>,
    pub onboarding: Arc<OnboardingTracker>,
}

impl AppContext {
    /// Wires every component over one shared store, following the
    /// `nexus_core::Store`-is-the-only-shared-dependency layering the
    /// component crates already assume.
    pub fn new(config: NexusConfig, store: Arc<dyn Store>, identity: nexus_auth::IdentityStore) -> Self {
        let tenancy = Arc::new(TenancyManager::new(store.clone()));
        let quota = Arc::new(QuotaEngine::new(tenancy.clone()));
        let sessions = Arc::new(SessionStore::new(store.clone(), config.history_cap));
        let agents = Arc::new(AgentRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(agents.clone(), quota.clone()));
        let workflows = Arc::new(WorkflowEngine::new(store.clone(), dispatcher.clone(), quota.clone()));
        let flags = Arc::new(FlagRegistry::new(config.rollout_rules.clone()));
        let onboarding = Arc::new(OnboardingTracker::new(store));
        let auth = AuthService::new(identity, config.clone());

        Self {
            config,
            auth,
            tenancy,
            quota,
            sessions,
            agents,
            dispatcher,
            workflows,
            flags,
            onboarding,
        }
    }

    /// the `get_tenant_context`. Used by the profile endpoint and by
    /// anything that needs a user's full resolved permission set beyond
    /// what a token's `permissions` claim already carries (e.g. after a
    /// role change, before the user's next token refresh).
    pub async fn get_tenant_context(&self, user_id: &str) -> NexusResult<TenantContextView> {
        let user = self.auth.get_user(user_id).await?;
        let org = self.tenancy.get_organization(&user.org_id).await?;
        let teams = self.tenancy.list_teams_for_org(&user.org_id).await?;
        let permissions = permissions_for_roles(&user.roles);
        Ok(TenantContextView {
            org,
            teams,
            roles: user.roles.iter().map(|r| format!("{r:?}")).collect(),
            permissions,
            preferences: user.preferences.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantContextView {
    pub org: Organization,
    pub teams: Vec<Team>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub preferences: HashMap<String, Value>,
}
