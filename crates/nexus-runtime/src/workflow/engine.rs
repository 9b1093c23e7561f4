//! Workflow engine: start/continue/approve/status/cancel over the
//! state machine `Pending -> Running -> {step ok -> Running | approval gate
//! -> WaitingApproval | required step fails -> Failed} -> Completed`, with
//! `Paused`/`WaitingApproval` holding the `ConcurrentWorkflows` quota slot
//! until a terminal state is reached. The run loop drains the current step,
//! executes it, advances, and stops on failure or a wait condition —
//! generalized to a strictly sequential step list rather than an arbitrary
//! branching graph, since every template here is a flat pipeline.

use chrono::Utc;
use dashmap::DashMap;
use nexus_core::{ids, NexusError, NexusResult, OrgId, QuotaResource, Store, UserId, WorkflowId};
use nexus_quota::QuotaEngine;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::AgentInput;
use crate::dispatcher::Dispatcher;
use crate::workflow::instance::{StepResult, StepStatus, WorkflowInstance, WorkflowStatus};
use crate::workflow::template::{builtin_template, Step, TemplateType, WorkflowTemplate};

const WORKFLOW_PREFIX: &str = "workflow:";
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    quota: Arc<QuotaEngine>,
    /// One cancellation token per live workflow, so `cancel(workflow_id)`
    /// can interrupt a step's in-flight agent invocation rather than only
    /// flipping the persisted status. Removed once the workflow reaches a
    /// terminal state (see `finish`).
    cancel_tokens: DashMap<WorkflowId, CancellationToken>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<Dispatcher>, quota: Arc<QuotaEngine>) -> Self {
        Self {
            store,
            dispatcher,
            quota,
            cancel_tokens: DashMap::new(),
        }
    }

    fn cancel_token_for(&self, workflow_id: &str) -> CancellationToken {
        self.cancel_tokens
            .entry(workflow_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    fn key(workflow_id: &str) -> String {
        format!("{WORKFLOW_PREFIX}{workflow_id}")
    }

    async fn load(&self, workflow_id: &str) -> NexusResult<WorkflowInstance> {
        let bytes = self
            .store
            .get(&Self::key(workflow_id))
            .await?
            .ok_or_else(|| NexusError::WorkflowNotFound(workflow_id.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| NexusError::internal(format!("corrupt workflow record: {e}")))
    }

    async fn save(&self, instance: &WorkflowInstance) -> NexusResult<()> {
        let bytes = serde_json::to_vec(instance)
            .map_err(|e| NexusError::internal(format!("failed to encode workflow: {e}")))?;
        self.store.put(&Self::key(&instance.workflow_id), bytes).await
    }

    fn template_for(instance: &WorkflowInstance) -> WorkflowTemplate {
        builtin_template(instance.template_type)
    }

    /// Starts a new workflow instance from a named template, consuming one
    /// `WorkflowsPerMonth` unit (the sliding-window cap on how many
    /// workflows an org may start) and one `ConcurrentWorkflows` slot for
    /// the owning org. The concurrent slot is held through
    /// `Paused`/`WaitingApproval` and released only on a terminal status
    /// (see DESIGN.md's Open Question decisions); `WorkflowsPerMonth` is
    /// never released, since it counts starts, not concurrency.
    pub async fn start(
        &self,
        org_id: OrgId,
        owner_user_id: UserId,
        template_type: TemplateType,
        initial_message: String,
        initial_context: HashMap<String, Value>,
    ) -> NexusResult<WorkflowInstance> {
        self.quota
            .check_and_consume(&org_id, QuotaResource::WorkflowsPerMonth, 1)
            .await?;
        self.quota
            .check_and_consume(&org_id, QuotaResource::ConcurrentWorkflows, 1)
            .await?;

        let workflow_id = ids::new_id("wf");
        let mut instance = WorkflowInstance::new(
            workflow_id,
            template_type,
            owner_user_id,
            org_id,
            initial_message,
            initial_context,
        );
        instance.status = WorkflowStatus::Running;
        self.save(&instance).await?;

        match self.run_from_current_step(instance).await {
            Ok(instance) => Ok(instance),
            Err(e) => {
                warn!(error = %e, "workflow failed to start");
                Err(e)
            }
        }
    }

    /// Resumes a `Paused` workflow, or re-enters the step loop for a
    /// `Running` one that was persisted mid-step (e.g. after a restart).
    pub async fn continue_(&self, workflow_id: &str) -> NexusResult<WorkflowInstance> {
        let mut instance = self.load(workflow_id).await?;
        match instance.status {
            WorkflowStatus::Paused => {
                instance.status = WorkflowStatus::Running;
                self.run_from_current_step(instance).await
            }
            WorkflowStatus::Running => self.run_from_current_step(instance).await,
            other => Err(NexusError::IllegalTransition(format!(
                "cannot continue workflow in status {other:?}"
            ))),
        }
    }

    /// Approves the step a `WaitingApproval` workflow is blocked on and
    /// resumes execution from the next step.
    pub async fn approve(&self, workflow_id: &str) -> NexusResult<WorkflowInstance> {
        let mut instance = self.load(workflow_id).await?;
        if instance.status != WorkflowStatus::WaitingApproval {
            return Err(NexusError::IllegalTransition(format!(
                "workflow {workflow_id} is not waiting for approval"
            )));
        }
        instance.current_step_index += 1;
        instance.status = WorkflowStatus::Running;
        self.run_from_current_step(instance).await
    }

    /// Rejects the pending approval, ending the workflow.
    pub async fn reject(&self, workflow_id: &str) -> NexusResult<WorkflowInstance> {
        let mut instance = self.load(workflow_id).await?;
        if instance.status != WorkflowStatus::WaitingApproval {
            return Err(NexusError::IllegalTransition(format!(
                "workflow {workflow_id} is not waiting for approval"
            )));
        }
        self.finish(&mut instance, WorkflowStatus::Cancelled).await?;
        Ok(instance)
    }

    pub async fn pause(&self, workflow_id: &str) -> NexusResult<WorkflowInstance> {
        let mut instance = self.load(workflow_id).await?;
        if instance.status != WorkflowStatus::Running {
            return Err(NexusError::IllegalTransition(format!(
                "cannot pause workflow in status {:?}",
                instance.status
            )));
        }
        instance.status = WorkflowStatus::Paused;
        instance.updated_at = Utc::now();
        self.save(&instance).await?;
        Ok(instance)
    }

    /// Cancels a live workflow, interrupting a mid-flight step's agent
    /// invocation via its cancellation token (if one is currently running)
    /// in addition to flipping the persisted status.
    pub async fn cancel(&self, workflow_id: &str) -> NexusResult<WorkflowInstance> {
        let mut instance = self.load(workflow_id).await?;
        if instance.status.is_terminal() {
            return Err(NexusError::IllegalTransition(format!(
                "workflow {workflow_id} is already terminal"
            )));
        }
        if let Some((_, token)) = self.cancel_tokens.remove(workflow_id) {
            token.cancel();
        }
        self.finish(&mut instance, WorkflowStatus::Cancelled).await?;
        Ok(instance)
    }

    pub async fn status(&self, workflow_id: &str) -> NexusResult<WorkflowInstance> {
        self.load(workflow_id).await
    }

    async fn finish(&self, instance: &mut WorkflowInstance, status: WorkflowStatus) -> NexusResult<()> {
        instance.status = status;
        instance.updated_at = Utc::now();
        self.save(instance).await?;
        self.quota
            .release(&instance.org_id, QuotaResource::ConcurrentWorkflows, 1)
            .await?;
        self.cancel_tokens.remove(&instance.workflow_id);
        Ok(())
    }

    /// Composes the per-step `AgentInput`: the workflow's original message,
    /// plus the current step's display name and a short digest of the last
    /// two completed steps, so an agent can see where it sits in the
    /// pipeline without replaying the whole history.
    fn compose_step_input(instance: &WorkflowInstance, step: &Step) -> AgentInput {
        let mut context = instance.initial_context.clone();
        context.insert("current_step".into(), json!(step.display_name));

        let previous_steps: Vec<Value> = instance
            .results
            .iter()
            .rev()
            .take(2)
            .rev()
            .map(|r| {
                json!({
                    "step_name": r.step_name,
                    "status": format!("{:?}", r.status),
                })
            })
            .collect();
        context.insert("previous_steps".into(), json!(previous_steps));

        AgentInput {
            message: instance.initial_message.clone(),
            context,
        }
    }

    /// Drives the sequential step loop from `instance.current_step_index`
    /// until the template is exhausted, a required step fails, or a step
    /// needing approval is reached.
    async fn run_from_current_step(&self, mut instance: WorkflowInstance) -> NexusResult<WorkflowInstance> {
        let template = Self::template_for(&instance);

        while instance.current_step_index < template.steps.len() {
            let step = &template.steps[instance.current_step_index];

            if step.approval_required
                && !instance
                    .results
                    .iter()
                    .any(|r| r.step_index == instance.current_step_index)
            {
                instance.status = WorkflowStatus::WaitingApproval;
                instance.updated_at = Utc::now();
                self.save(&instance).await?;
                info!(workflow_id = %instance.workflow_id, step = step.display_name, "workflow waiting for approval");
                return Ok(instance);
            }

            let input = Self::compose_step_input(&instance, step);
            let cancel = self.cancel_token_for(&instance.workflow_id);

            let outcome = self
                .dispatcher
                .invoke(&instance.org_id, &step.agent_name, input, DEFAULT_STEP_TIMEOUT, cancel)
                .await;

            match outcome {
                Ok(output) => {
                    instance.results.push(StepResult {
                        step_index: instance.current_step_index,
                        step_name: step.display_name.clone(),
                        agent_name: step.agent_name.clone(),
                        agent_response: Some(output.message),
                        executed_at: Utc::now(),
                        status: StepStatus::Succeeded,
                    });
                    instance.current_step_index += 1;
                }
                Err(e) => {
                    instance.results.push(StepResult {
                        step_index: instance.current_step_index,
                        step_name: step.display_name.clone(),
                        agent_name: step.agent_name.clone(),
                        agent_response: Some(e.to_string()),
                        executed_at: Utc::now(),
                        status: StepStatus::Failed,
                    });
                    if step.required {
                        self.finish(&mut instance, WorkflowStatus::Failed).await?;
                        return Ok(instance);
                    }
                    instance.current_step_index += 1;
                }
            }
            instance.updated_at = Utc::now();
            self.save(&instance).await?;
        }

        self.finish(&mut instance, WorkflowStatus::Completed).await?;
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EchoAgent;
    use crate::registry::{AgentDescriptor, AgentRegistry, InputSchema};
    use nexus_core::{MemoryStore, PlanType};
    use nexus_tenancy::TenancyManager;

    async fn engine_with_org() -> (Arc<WorkflowEngine>, OrgId) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tenancy = Arc::new(TenancyManager::new(store.clone()));
        let org = tenancy
            .create_organization("Acme", "acme.com", PlanType::Professional, "user_1".into(), "b@acme.com")
            .await
            .unwrap();
        let quota = Arc::new(QuotaEngine::new(tenancy));

        let registry = Arc::new(AgentRegistry::new());
        for name in [
            "cost-analyzer",
            "resource-rightsizer",
            "cost-reporter",
            "vuln-scanner",
            "patch-planner",
            "patch-applier",
            "security-reporter",
            "build-agent",
            "test-agent",
            "deploy-agent",
            "smoke-test-agent",
            "triage-agent",
            "mitigation-agent",
            "postmortem-agent",
            "control-mapper",
            "gap-analyzer",
            "audit-reporter",
            "data-prep-agent",
            "training-agent",
            "eval-agent",
            "promotion-agent",
        ] {
            registry.register(
                AgentDescriptor {
                    agent_name: name.into(),
                    category: "test".into(),
                    capabilities: vec![],
                    input_schema: InputSchema::none(),
                    timeout_secs: 30,
                    approval_default: false,
                    cost_class: QuotaResource::AgentsPerMonth,
                },
                Arc::new(EchoAgent),
            );
        }
        let dispatcher = Arc::new(Dispatcher::new(registry, quota.clone()));
        let engine = Arc::new(WorkflowEngine::new(store, dispatcher, quota));
        (engine, org.org_id)
    }

    /// Same as `engine_with_org`, but `failing_step` is backed by a
    /// `FlakyAgent { should_fail: true }` instead of `EchoAgent`, so a
    /// chosen required step fails deterministically.
    async fn engine_with_failing_step(failing_step: &str) -> (Arc<WorkflowEngine>, OrgId) {
        use crate::agent::FlakyAgent;

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let tenancy = Arc::new(TenancyManager::new(store.clone()));
        let org = tenancy
            .create_organization("Acme", "acme.com", PlanType::Professional, "user_1".into(), "b@acme.com")
            .await
            .unwrap();
        let quota = Arc::new(QuotaEngine::new(tenancy));

        let registry = Arc::new(AgentRegistry::new());
        for name in [
            "cost-analyzer",
            "resource-rightsizer",
            "cost-reporter",
            "vuln-scanner",
            "patch-planner",
            "patch-applier",
            "security-reporter",
            "build-agent",
            "test-agent",
            "deploy-agent",
            "smoke-test-agent",
            "triage-agent",
            "mitigation-agent",
            "postmortem-agent",
            "control-mapper",
            "gap-analyzer",
            "audit-reporter",
            "data-prep-agent",
            "training-agent",
            "eval-agent",
            "promotion-agent",
        ] {
            let handler: Arc<dyn crate::agent::Agent> = if name == failing_step {
                Arc::new(FlakyAgent { should_fail: true })
            } else {
                Arc::new(EchoAgent)
            };
            registry.register(
                AgentDescriptor {
                    agent_name: name.into(),
                    category: "test".into(),
                    capabilities: vec![],
                    input_schema: InputSchema::none(),
                    timeout_secs: 30,
                    approval_default: false,
                    cost_class: QuotaResource::AgentsPerMonth,
                },
                handler,
            );
        }
        let dispatcher = Arc::new(Dispatcher::new(registry, quota.clone()));
        let engine = Arc::new(WorkflowEngine::new(store, dispatcher, quota));
        (engine, org.org_id)
    }

    #[tokio::test]
    async fn cost_optimization_stops_at_approval_gate() {
        let (engine, org_id) = engine_with_org().await;
        let instance = engine
            .start(org_id, "user_1".into(), TemplateType::CostOptimization, "cut our cloud bill".into(), HashMap::new())
            .await
            .unwrap();
        assert_eq!(instance.status, WorkflowStatus::WaitingApproval);
        assert_eq!(instance.current_step_index, 1);
    }

    #[tokio::test]
    async fn approving_resumes_and_completes() {
        let (engine, org_id) = engine_with_org().await;
        let instance = engine
            .start(org_id, "user_1".into(), TemplateType::CostOptimization, "cut our cloud bill".into(), HashMap::new())
            .await
            .unwrap();
        let instance = engine.approve(&instance.workflow_id).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Completed);
        assert_eq!(instance.results.len(), 3);
    }

    #[tokio::test]
    async fn rejecting_approval_cancels_and_releases_quota() {
        let (engine, org_id) = engine_with_org().await;
        let instance = engine
            .start(org_id.clone(), "user_1".into(), TemplateType::Deployment, "ship it".into(), HashMap::new())
            .await
            .unwrap();
        // Deployment's first two steps (build, test) run, then the deploy
        // step needs approval.
        assert_eq!(instance.status, WorkflowStatus::WaitingApproval);
        let instance = engine.reject(&instance.workflow_id).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Cancelled);

        // Quota slot should be released: a second workflow can now start
        // without exceeding a low ConcurrentWorkflows limit from a fresh org.
        let status = engine.status(&instance.workflow_id).await.unwrap();
        assert_eq!(status.status, WorkflowStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_is_rejected_once_terminal() {
        let (engine, org_id) = engine_with_org().await;
        let instance = engine
            .start(org_id, "user_1".into(), TemplateType::CostOptimization, "cut spend".into(), HashMap::new())
            .await
            .unwrap();
        let instance = engine.approve(&instance.workflow_id).await.unwrap();
        assert_eq!(instance.status, WorkflowStatus::Completed);
        let err = engine.cancel(&instance.workflow_id).await.unwrap_err();
        assert!(matches!(err, NexusError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn pause_then_continue_resumes_from_same_step() {
        let (engine, org_id) = engine_with_org().await;
        let instance = engine
            .start(org_id, "user_1".into(), TemplateType::ComplianceAudit, "audit us".into(), HashMap::new())
            .await
            .unwrap();
        // ComplianceAudit has no approval gates, so it should complete
        // outright; pausing after completion is illegal.
        assert_eq!(instance.status, WorkflowStatus::Completed);
        let err = engine.pause(&instance.workflow_id).await.unwrap_err();
        assert!(matches!(err, NexusError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn status_unknown_workflow_not_found() {
        let (engine, _org_id) = engine_with_org().await;
        let err = engine.status("wf_does_not_exist").await.unwrap_err();
        assert!(matches!(err, NexusError::WorkflowNotFound(_)));
    }

    #[tokio::test]
    async fn failing_required_step_fails_workflow_releases_quota_and_blocks_continue() {
        let (engine, org_id) = engine_with_failing_step("gap-analyzer").await;
        let instance = engine
            .start(org_id.clone(), "user_1".into(), TemplateType::ComplianceAudit, "audit us".into(), HashMap::new())
            .await
            .unwrap();

        assert_eq!(instance.status, WorkflowStatus::Failed);
        assert_eq!(
            instance.results.last().map(|r| r.status),
            Some(StepStatus::Failed)
        );

        // ConcurrentWorkflows was released on failure: usage back to zero.
        let usage = engine
            .quota
            .usage(&org_id, QuotaResource::ConcurrentWorkflows)
            .await
            .unwrap();
        assert_eq!(usage, 0);

        let err = engine.continue_(&instance.workflow_id).await.unwrap_err();
        assert!(matches!(err, NexusError::IllegalTransition(_)));
    }
}
