//! Request/response envelope shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NexusError;
use crate::ids::{OrgId, RequestId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
    pub org_id: OrgId,
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: RequestId,
    pub api_version: String,
}

impl Default for ResponseMetadata {
    fn default() -> Self {
        Self {
            request_id: crate::ids::new_request_id(),
            api_version: "2.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    pub data: T,
    pub tenant_context: TenantContext,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: u16,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEnvelope {
    pub error: ErrorBody,
    pub tenant_context: PartialTenantContext,
}

/// Unlike the success envelope, failures may occur before a tenant context
/// is fully resolved (e.g. an unknown bearer token never yields a user_id).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartialTenantContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl FailureEnvelope {
    pub fn from_error(err: &NexusError, ctx: PartialTenantContext) -> Self {
        Self {
            error: ErrorBody {
                message: err.to_string(),
                code: err.http_status(),
                kind: err.kind_name().to_string(),
                timestamp: Utc::now(),
            },
            tenant_context: ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelope_carries_stable_kind_and_code() {
        let env = FailureEnvelope::from_error(
            &NexusError::Forbidden("nope".into()),
            PartialTenantContext {
                org_id: Some("org1".into()),
                user_id: Some("u1".into()),
            },
        );
        assert_eq!(env.error.kind, "Forbidden");
        assert_eq!(env.error.code, 403);
    }
}
