//! Onboarding progress tracker: `(org_id, stage, tasks[])` with
//! per-task `completed_at`; progress % is completed/total across all
//! stages. A thin state store with no scheduling semantics of its own —
//! nothing here decides *when* a task becomes available, only whether it's
//! done.

use chrono::{DateTime, Utc};
use nexus_core::{NexusError, NexusResult, OrgId, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ONBOARDING_PREFIX: &str = "onboarding:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStage {
    AccountCreated,
    OrganizationConfigured,
    FirstAgentInvoked,
    FirstWorkflowCompleted,
    TeamExpanded,
    Graduated,
}

impl OnboardingStage {
    const ORDER: [OnboardingStage; 6] = [
        OnboardingStage::AccountCreated,
        OnboardingStage::OrganizationConfigured,
        OnboardingStage::FirstAgentInvoked,
        OnboardingStage::FirstWorkflowCompleted,
        OnboardingStage::TeamExpanded,
        OnboardingStage::Graduated,
    ];

    fn tasks_for(self) -> &'static [&'static str] {
        match self {
            OnboardingStage::AccountCreated => &["verify_email", "set_password"],
            OnboardingStage::OrganizationConfigured => &["name_organization", "set_billing_email"],
            OnboardingStage::FirstAgentInvoked => &["run_first_agent"],
            OnboardingStage::FirstWorkflowCompleted => &["start_first_workflow", "complete_first_workflow"],
            OnboardingStage::TeamExpanded => &["invite_teammate"],
            OnboardingStage::Graduated => &["acknowledge_graduation"],
        }
    }

    fn next(self) -> Option<OnboardingStage> {
        let idx = Self::ORDER.iter().position(|s| *s == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingTask {
    pub stage: OnboardingStage,
    pub name: String,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingState {
    pub org_id: OrgId,
    pub current_stage: OnboardingStage,
    pub tasks: Vec<OnboardingTask>,
    pub started_at: DateTime<Utc>,
}

impl OnboardingState {
    fn new(org_id: OrgId) -> Self {
        let tasks = OnboardingStage::ORDER
            .iter()
            .flat_map(|stage| {
                stage.tasks_for().iter().map(move |name| OnboardingTask {
                    stage: *stage,
                    name: name.to_string(),
                    completed_at: None,
                })
            })
            .collect();
        Self {
            org_id,
            current_stage: OnboardingStage::AccountCreated,
            tasks,
            started_at: Utc::now(),
        }
    }

    /// Percentage of tasks completed across all stages, rounded down.
    pub fn progress_percent(&self) -> u8 {
        if self.tasks.is_empty() {
            return 100;
        }
        let completed = self.tasks.iter().filter(|t| t.completed_at.is_some()).count();
        ((completed * 100) / self.tasks.len()) as u8
    }

    fn stage_complete(&self, stage: OnboardingStage) -> bool {
        self.tasks
            .iter()
            .filter(|t| t.stage == stage)
            .all(|t| t.completed_at.is_some())
    }
}

pub struct OnboardingTracker {
    store: Arc<dyn Store>,
}

impl OnboardingTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn key(org_id: &str) -> String {
        format!("{ONBOARDING_PREFIX}{org_id}")
    }

    async fn save(&self, state: &OnboardingState) -> NexusResult<()> {
        let bytes = serde_json::to_vec(state)
            .map_err(|e| NexusError::internal(format!("failed to encode onboarding state: {e}")))?;
        self.store.put(&Self::key(&state.org_id), bytes).await
    }

    /// Starts (or restarts) onboarding for an organization, seeding every
    /// stage's tasks as incomplete.
    pub async fn initialize(&self, org_id: OrgId) -> NexusResult<OnboardingState> {
        let state = OnboardingState::new(org_id);
        self.save(&state).await?;
        Ok(state)
    }

    pub async fn status(&self, org_id: &str) -> NexusResult<OnboardingState> {
        let bytes = self
            .store
            .get(&Self::key(org_id))
            .await?
            .ok_or_else(|| NexusError::not_found(format!("onboarding state for {org_id}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| NexusError::internal(format!("corrupt onboarding record: {e}")))
    }

    /// Marks one task done and, if that was the last task in the current
    /// stage, advances `current_stage` to the next one.
    pub async fn complete_task(&self, org_id: &str, task_name: &str) -> NexusResult<OnboardingState> {
        let mut state = self.status(org_id).await?;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.name == task_name)
            .ok_or_else(|| NexusError::NotFound(format!("onboarding task {task_name}")))?;
        task.completed_at = Some(Utc::now());

        if state.stage_complete(state.current_stage) {
            if let Some(next) = state.current_stage.next() {
                state.current_stage = next;
            }
        }

        self.save(&state).await?;
        Ok(state)
    }
}
