//! Session and conversation data model: the durable per-(user, session)
//! conversational context, its append-only history, and the derived
//! context rebuilt on each turn.

use chrono::{DateTime, Utc};
use nexus_core::{AgentName, OrgId, SessionId, UserId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub agent_name: AgentName,
    pub input: String,
    /// A short digest of the agent's result, not the full payload — full
    /// results live in the workflow/agent run record, not duplicated into
    /// history.
    pub result_summary: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Most recently used agents, most-recent-first, capped at 10.
    pub recent_agents: Vec<AgentName>,
    /// Most recently discussed topics, most-recent-first, capped at 15.
    pub recent_topics: Vec<String>,
    /// Usage counts per agent, used to rank favorites.
    pub favorite_agents: HashMap<AgentName, u32>,
    /// The workflow instance this session last started or resumed, if its
    /// latest known status is non-terminal.
    pub current_workflow_id: Option<WorkflowId>,
    /// Workflow instances waiting on this session's owner to approve,
    /// reject, pause, or cancel a gated step.
    pub pending_approvals: Vec<WorkflowId>,
    /// A short digest of the last few conversation entries, refreshed on
    /// every append.
    pub summary: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            recent_agents: Vec::new(),
            recent_topics: Vec::new(),
            favorite_agents: HashMap::new(),
            current_workflow_id: None,
            pending_approvals: Vec::new(),
            summary: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub org_id: OrgId,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub conversation_history: Vec<ConversationEntry>,
    pub context: SessionContext,
}

impl Session {
    pub fn new(session_id: SessionId, user_id: UserId, org_id: OrgId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            org_id,
            created_at: now,
            last_active_at: now,
            conversation_history: Vec::new(),
            context: SessionContext::default(),
        }
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.last_active_at)
    }
}
