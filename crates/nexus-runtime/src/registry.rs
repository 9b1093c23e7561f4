//! Agent registry: a static table of `AgentDescriptor`s (what an agent is)
//! paired with a `DashMap<String, Arc<dyn Agent>>` of live handlers (what
//! actually executes it), extensible at runtime via `register`.

use crate::agent::Agent;
use dashmap::DashMap;
use nexus_core::{NexusError, NexusResult, QuotaResource};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// JSON-schema-shaped input description, wrapping a `serde_json::Value`
/// schema in a named struct rather than hand-rolling a typed schema DSL.
#[derive(Debug, Clone)]
pub struct InputSchema {
    pub schema: Value,
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn none() -> Self {
        Self {
            schema: Value::Null,
            required: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub agent_name: String,
    pub category: String,
    pub capabilities: Vec<String>,
    pub input_schema: InputSchema,
    pub timeout_secs: u64,
    pub approval_default: bool,
    pub cost_class: QuotaResource,
}

impl AgentDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

struct Registration {
    descriptor: AgentDescriptor,
    handler: Arc<dyn Agent>,
}

/// Live registry of agent handlers. `DashMap`-backed so registration
/// (rare, typically at startup) and lookup (every dispatch) don't contend.
pub struct AgentRegistry {
    agents: DashMap<String, Registration>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    pub fn register(&self, descriptor: AgentDescriptor, handler: Arc<dyn Agent>) {
        self.agents.insert(
            descriptor.agent_name.clone(),
            Registration { descriptor, handler },
        );
    }

    pub fn get_descriptor(&self, name: &str) -> Option<AgentDescriptor> {
        self.agents.get(name).map(|r| r.descriptor.clone())
    }

    pub fn get_handler(&self, name: &str) -> NexusResult<Arc<dyn Agent>> {
        self.agents
            .get(name)
            .map(|r| r.handler.clone())
            .ok_or_else(|| NexusError::UnknownAgent(name.to_string()))
    }

    pub fn list(&self) -> Vec<AgentDescriptor> {
        self.agents.iter().map(|r| r.descriptor.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.agents.len()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EchoAgent;

    fn echo_descriptor() -> AgentDescriptor {
        AgentDescriptor {
            agent_name: "echo".into(),
            category: "test".into(),
            capabilities: vec!["echo".into()],
            input_schema: InputSchema::none(),
            timeout_secs: 30,
            approval_default: false,
            cost_class: QuotaResource::AgentsPerMonth,
        }
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let registry = AgentRegistry::new();
        registry.register(echo_descriptor(), Arc::new(EchoAgent));
        assert!(registry.exists("echo"));
        assert_eq!(registry.count(), 1);
        assert!(registry.get_handler("echo").is_ok());
        assert_eq!(registry.get_descriptor("echo").unwrap().category, "test");
    }

    #[test]
    fn unknown_agent_lookup_fails() {
        let registry = AgentRegistry::new();
        let err = registry.get_handler("nope").unwrap_err();
        assert!(matches!(err, NexusError::UnknownAgent(_)));
    }
}
