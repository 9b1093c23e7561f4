//! Agent Invocation Interface: the typed contract between the core and the
//! agents it invokes. One invocation carries an input payload, a deadline,
//! and a cancellation handle; the agent's static metadata (capabilities,
//! input schema, timeout) lives one layer up in `registry::AgentDescriptor`.

use async_trait::async_trait;
use nexus_core::NexusResult;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the caller hands an agent: the user's message plus whatever side
/// context the session/workflow layer has accumulated (recent topics,
/// workflow step variables, and the like).
#[derive(Debug, Clone)]
pub struct AgentInput {
    pub message: String,
    pub context: HashMap<String, Value>,
}

impl AgentInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// What an agent hands back on success. `data` is the free-form
/// result payload; `data.summary_fields`, if present, is the side-effect
/// visibility channel the session store's digest logic reads — an agent
/// that changed something outside the conversation (deployed, filed a
/// ticket, rotated a key) surfaces it there rather than forcing callers to
/// parse `message`.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub message: String,
    pub agent_name: String,
    pub intent: Option<String>,
    pub confidence: f64,
    pub real_execution: bool,
    pub data: HashMap<String, Value>,
}

impl AgentOutput {
    pub fn new(agent_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent_name: agent_name.into(),
            intent: None,
            confidence: 1.0,
            real_execution: true,
            data: HashMap::new(),
        }
    }

    /// The `summary_fields` entry of `data`, if the agent populated one.
    /// Read by `nexus_session::SessionStore::append` when it builds a
    /// conversation entry's `result_summary`.
    pub fn summary_fields(&self) -> Option<&Value> {
        self.data.get("summary_fields")
    }
}

/// Per-invocation execution context: how long the dispatcher will wait
/// before giving up, and a token the dispatcher signals if the caller
/// cancels the request out from under a still-running agent.
#[derive(Clone)]
pub struct AgentContext {
    pub deadline: Duration,
    pub cancel: CancellationToken,
}

impl AgentContext {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    async fn execute(&self, input: &AgentInput, ctx: &AgentContext) -> NexusResult<AgentOutput>;
}

/// Reference fixture: always succeeds, echoing the input back. Exists
/// purely to drive dispatcher/workflow integration tests.
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn execute(&self, input: &AgentInput, _ctx: &AgentContext) -> NexusResult<AgentOutput> {
        let mut out = AgentOutput::new("echo", format!("echo: {}", input.message));
        out.data
            .insert("summary_fields".into(), Value::String(input.message.clone()));
        Ok(out)
    }
}

/// Reference fixture: fails on demand (constructed with `should_fail`),
/// used to exercise required-step-failure and approval-gate paths in the
/// workflow engine's tests without needing a real external dependency.
pub struct FlakyAgent {
    pub should_fail: bool,
}

#[async_trait]
impl Agent for FlakyAgent {
    async fn execute(&self, input: &AgentInput, ctx: &AgentContext) -> NexusResult<AgentOutput> {
        if ctx.is_cancelled() {
            return Err(nexus_core::NexusError::Cancelled);
        }
        if self.should_fail {
            return Err(nexus_core::NexusError::AgentError("flaky agent failed on demand".into()));
        }
        Ok(AgentOutput::new("flaky", format!("handled: {}", input.message)))
    }
}
