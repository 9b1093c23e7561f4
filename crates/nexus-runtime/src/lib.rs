//! Agent registry, dispatcher, and workflow engine.

pub mod agent;
pub mod dispatcher;
pub mod registry;
pub mod workflow;

pub use agent::{Agent, AgentContext, AgentInput, AgentOutput, EchoAgent, FlakyAgent};
pub use dispatcher::Dispatcher;
pub use registry::{AgentDescriptor, AgentRegistry, InputSchema};
pub use workflow::{
    builtin_template, detect_template, RiskLevel, Step, StepResult, StepStatus, TemplateType,
    WorkflowEngine, WorkflowInstance, WorkflowStatus, WorkflowTemplate,
};
