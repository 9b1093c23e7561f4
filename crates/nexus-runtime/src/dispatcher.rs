//! Agent dispatcher: resolve -> validate -> timeout -> cancel ->
//! map-errors. Timeout races `tokio::time::timeout` against a
//! `tokio_util::sync::CancellationToken` via `tokio::select!`, so a
//! cancelled invocation and a timed-out one are reported distinctly.

use crate::agent::{AgentContext, AgentInput, AgentOutput};
use crate::registry::AgentRegistry;
use nexus_core::{NexusError, NexusResult};
use nexus_quota::QuotaEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    quota: Arc<QuotaEngine>,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>, quota: Arc<QuotaEngine>) -> Self {
        Self { registry, quota }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Invokes `agent_name` with `input`, bounding execution by the lesser
    /// of the agent's configured timeout and the caller-supplied deadline.
    /// `cancel` lets an in-flight invocation be interrupted externally
    /// (e.g. the owning workflow is cancelled while a step is running).
    /// Charges one unit of the descriptor's `cost_class` quota resource to
    /// `org_id` before the handler runs; a rejected charge surfaces as
    /// `QuotaExceeded` without ever calling the handler.
    pub async fn invoke(
        &self,
        org_id: &str,
        agent_name: &str,
        input: AgentInput,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> NexusResult<AgentOutput> {
        let descriptor = self
            .registry
            .get_descriptor(agent_name)
            .ok_or_else(|| NexusError::UnknownAgent(agent_name.to_string()))?;

        for field in &descriptor.input_schema.required {
            if !input.context.contains_key(field) && field != "message" {
                return Err(NexusError::InvalidInput(format!(
                    "missing required field `{field}` for agent `{agent_name}`"
                )));
            }
        }
        if input.message.trim().is_empty() {
            return Err(NexusError::InvalidInput("message must not be empty".into()));
        }

        self.quota.check_and_consume(org_id, descriptor.cost_class, 1).await?;

        let handler = self.registry.get_handler(agent_name)?;
        let effective_timeout = descriptor.timeout().min(deadline);
        let ctx = AgentContext {
            deadline: effective_timeout,
            cancel: cancel.clone(),
        };

        debug!(agent_name, timeout_secs = effective_timeout.as_secs(), "dispatching agent");

        let run = handler.execute(&input, &ctx);
        tokio::select! {
            result = tokio::time::timeout(effective_timeout, run) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => {
                        warn!(agent_name, "agent timed out");
                        Err(NexusError::AgentTimeout(effective_timeout))
                    }
                }
            }
            _ = cancel.cancelled() => {
                warn!(agent_name, "agent invocation cancelled");
                Err(NexusError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{EchoAgent, FlakyAgent};
    use crate::registry::{AgentDescriptor, InputSchema};
    use nexus_core::{MemoryStore, PlanType, QuotaResource, Store};
    use nexus_tenancy::TenancyManager;

    fn registry_with(name: &str, timeout_secs: u64, agent: Arc<dyn crate::agent::Agent>) -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::new());
        registry.register(
            AgentDescriptor {
                agent_name: name.into(),
                category: "test".into(),
                capabilities: vec![],
                input_schema: InputSchema::none(),
                timeout_secs,
                approval_default: false,
                cost_class: QuotaResource::AgentsPerMonth,
            },
            agent,
        );
        registry
    }

    /// A quota engine backed by a fresh org, for dispatcher tests that
    /// don't care about quota admission itself, just that invocations
    /// charge *some* org without error.
    async fn quota_with_org() -> (Arc<QuotaEngine>, String) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tenancy = Arc::new(TenancyManager::new(store));
        let org = tenancy
            .create_organization("Acme", "acme.com", PlanType::Professional, "user_1".into(), "b@acme.com")
            .await
            .unwrap();
        (Arc::new(QuotaEngine::new(tenancy)), org.org_id)
    }

    #[tokio::test]
    async fn dispatch_unknown_agent_fails() {
        let (quota, org_id) = quota_with_org().await;
        let dispatcher = Dispatcher::new(Arc::new(AgentRegistry::new()), quota);
        let err = dispatcher
            .invoke(&org_id, "ghost", AgentInput::new("hi"), Duration::from_secs(1), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn dispatch_rejects_empty_message() {
        let (quota, org_id) = quota_with_org().await;
        let registry = registry_with("echo", 5, Arc::new(EchoAgent));
        let dispatcher = Dispatcher::new(registry, quota);
        let err = dispatcher
            .invoke(&org_id, "echo", AgentInput::new(""), Duration::from_secs(1), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn dispatch_succeeds_for_registered_agent() {
        let (quota, org_id) = quota_with_org().await;
        let registry = registry_with("echo", 5, Arc::new(EchoAgent));
        let dispatcher = Dispatcher::new(registry, quota);
        let out = dispatcher
            .invoke(&org_id, "echo", AgentInput::new("ping"), Duration::from_secs(5), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.message, "echo: ping");
    }

    #[tokio::test]
    async fn dispatch_charges_agents_per_month_quota() {
        let (quota, org_id) = quota_with_org().await;
        let registry = registry_with("echo", 5, Arc::new(EchoAgent));
        let dispatcher = Dispatcher::new(registry, quota.clone());
        assert_eq!(quota.usage(&org_id, QuotaResource::AgentsPerMonth).await.unwrap(), 0);
        dispatcher
            .invoke(&org_id, "echo", AgentInput::new("ping"), Duration::from_secs(5), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(quota.usage(&org_id, QuotaResource::AgentsPerMonth).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dispatch_propagates_agent_error() {
        let (quota, org_id) = quota_with_org().await;
        let registry = registry_with("flaky", 5, Arc::new(FlakyAgent { should_fail: true }));
        let dispatcher = Dispatcher::new(registry, quota);
        let err = dispatcher
            .invoke(&org_id, "flaky", AgentInput::new("go"), Duration::from_secs(5), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::AgentError(_)));
    }

    #[tokio::test]
    async fn dispatch_cancellation_short_circuits() {
        let (quota, org_id) = quota_with_org().await;
        let registry = registry_with("flaky", 5, Arc::new(FlakyAgent { should_fail: false }));
        let dispatcher = Dispatcher::new(registry, quota);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = dispatcher
            .invoke(&org_id, "flaky", AgentInput::new("go"), Duration::from_secs(5), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::Cancelled));
    }
}
