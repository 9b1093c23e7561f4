//! Token payload shape. Signing/verification lives in `nexus-auth`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrgId, TeamId, UserId};
use crate::user::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub team_ids: Vec<TeamId>,
    pub roles: Vec<Role>,
    pub permissions: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub kind: TokenKind,
    /// Unique identifier used for revocation.
    pub jti: String,
}

impl TokenClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        now > self.expires_at + skew
    }
}
