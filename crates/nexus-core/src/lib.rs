pub mod config;
pub mod envelope;
pub mod envutil;
pub mod error;
pub mod ids;
pub mod org;
pub mod quota;
pub mod store;
pub mod token;
pub mod user;

pub use config::{LockoutConfig, NexusConfig, PasswordPolicy, RolloutRule};
pub use envelope::{
    ErrorBody, FailureEnvelope, PartialTenantContext, ResponseMetadata, SuccessEnvelope,
    TenantContext,
};
pub use error::{NexusError, NexusResult};
pub use ids::{AgentName, OrgId, RequestId, SessionId, TeamId, UserId, WorkflowId};
pub use org::{Organization, PlanType, Team};
pub use quota::{QuotaMap, QuotaResource, QuotaWindow};
pub use store::{FileStore, MemoryStore, Store};
pub use token::{TokenClaims, TokenKind};
pub use user::{PasswordHash, Role, User};
