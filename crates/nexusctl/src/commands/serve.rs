//! `nexusctl serve`: load a config, assemble the runtime, bind a listener,
//! race it against `ctrl_c()`. Agents are registered programmatically
//! rather than discovered from a directory — this registers one stub
//! handler per agent name the built-in workflow templates reference, so a
//! template started against this listener can run every step to
//! completion out of the box.

use async_trait::async_trait;
use nexus_api::{serve as serve_http, AppContext, RequestShell};
use nexus_core::{MemoryStore, NexusConfig, NexusResult, QuotaResource, Store};
use nexus_runtime::{Agent, AgentContext, AgentDescriptor, AgentInput, AgentOutput, InputSchema};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Echoes back a success for whatever agent name it was registered under.
/// Stands in for the real cost/security/deployment/... integrations this
/// platform would dispatch to in production.
struct StubAgent {
    name: String,
}

#[async_trait]
impl Agent for StubAgent {
    async fn execute(&self, input: &AgentInput, _ctx: &AgentContext) -> NexusResult<AgentOutput> {
        let mut out = AgentOutput::new(
            self.name.clone(),
            format!("{}: completed for '{}'", self.name, input.message),
        );
        out.data.insert(
            "summary_fields".into(),
            serde_json::Value::String(format!("{} ran", self.name)),
        );
        Ok(out)
    }
}

/// One entry per `agent_name` referenced by a builtin workflow template
/// (see `nexus_runtime::builtin_template`); kept as a flat list here rather
/// than derived from the templates at startup since the templates don't
/// expose an "all agent names" accessor and this list only needs to track
/// six hand-authored templates.
const BUILTIN_AGENT_NAMES: &[&str] = &[
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
];

fn register_builtin_agents(ctx: &AppContext) {
    for name in BUILTIN_AGENT_NAMES {
        let descriptor = AgentDescriptor {
            agent_name: (*name).to_string(),
            category: "builtin".into(),
            capabilities: vec![(*name).to_string()],
            input_schema: InputSchema::none(),
            timeout_secs: 60,
            approval_default: false,
            cost_class: QuotaResource::AgentsPerMonth,
        };
        ctx.agents.register(descriptor, Arc::new(StubAgent { name: (*name).to_string() }));
    }
}

pub async fn execute(
    config_path: Option<&str>,
    port: Option<u16>,
    host: &str,
    data_dir: Option<&str>,
) -> anyhow::Result<()> {
    let config = NexusConfig::load(config_path.map(Path::new))?;

    let store: Arc<dyn Store> = match data_dir {
        Some(dir) => Arc::new(nexus_core::FileStore::new(dir).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let identity = nexus_auth::IdentityStore::load(store.clone()).await?;
    let ctx = AppContext::new(config, store, identity);
    register_builtin_agents(&ctx);

    let port = port.unwrap_or(8080);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {host}:{port}: {e}"))?;

    println!("nexusctl: starting request shell on http://{addr}");
    println!("nexusctl: {} builtin agents registered", BUILTIN_AGENT_NAMES.len());
    info!(%addr, "serving nexus-api");

    let shell = Arc::new(RequestShell::new(Arc::new(ctx)));

    tokio::select! {
        result = serve_http(shell, addr) => {
            result.map_err(|e| anyhow::anyhow!("server error: {e}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("nexusctl: shutting down");
        }
    }

    Ok(())
}
