//! All identifiers in the core are opaque strings. Type aliases keep
//! call sites self-documenting without imposing a newtype tax on every
//! serde boundary.

pub type OrgId = String;
pub type TeamId = String;
pub type UserId = String;
pub type SessionId = String;
pub type WorkflowId = String;
pub type AgentName = String;
pub type RequestId = String;

/// Generates a prefixed opaque id, e.g. `new_id("org")` -> `org_3f9a2c1d`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

/// Monotonic-looking request id for the response envelope's `metadata.request_id`.
/// Not actually monotonic across restarts (no persisted counter in-process);
/// uses a UUID so it is at least globally unique, matching the "req_<id>" shape.
pub fn new_request_id() -> RequestId {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}
