//! Workflow instance state: the dynamic record of one template's
//! execution, one `StepResult` per completed step, plus the status enum
//! covering the single wait reason this system has (`WaitingApproval`).

use chrono::{DateTime, Utc};
use nexus_core::{OrgId, UserId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::template::TemplateType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    WaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub step_name: String,
    pub agent_name: String,
    pub agent_response: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub workflow_id: WorkflowId,
    pub template_type: TemplateType,
    pub owner_user_id: UserId,
    pub org_id: OrgId,
    pub status: WorkflowStatus,
    pub current_step_index: usize,
    pub results: Vec<StepResult>,
    pub initial_message: String,
    pub initial_context: HashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn new(
        workflow_id: WorkflowId,
        template_type: TemplateType,
        owner_user_id: UserId,
        org_id: OrgId,
        initial_message: String,
        initial_context: HashMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            template_type,
            owner_user_id,
            org_id,
            status: WorkflowStatus::Pending,
            current_step_index: 0,
            results: Vec::new(),
            initial_message,
            initial_context,
            started_at: now,
            updated_at: now,
        }
    }
}
