//! User identity data model. Password hashing lives in `nexus-auth`
//! (it owns the KDF); this module only defines the persisted shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{OrgId, TeamId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Role {
    SuperAdmin,
    OrgOwner,
    OrgAdmin,
    TeamLead,
    TeamMember,
    ReadOnly,
}

impl Role {
    /// `ReadOnly` excludes all other roles (invariant) — a user's role
    /// set can never contain `ReadOnly` alongside anything else.
    pub fn exclusive(self) -> bool {
        matches!(self, Role::ReadOnly)
    }
}

/// A password hash in `{kdf_name, iterations, salt, hash}` form. The store
/// never returns this over the wire — callers only ever see
/// [`User`] with this field, and API-facing serialization of `User` must
/// go through a view type that omits it (see `nexus-api`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHash {
    pub kdf_name: String,
    pub iterations: u32,
    pub salt: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub password_hash: PasswordHash,
    pub org_id: OrgId,
    #[serde(default)]
    pub team_ids: Vec<TeamId>,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub mfa_enrolled: bool,
    #[serde(default)]
    pub mfa_secret: Option<String>,
    #[serde(default)]
    pub mfa_backup_codes: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferences: HashMap<String, serde_json::Value>,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(Role::SuperAdmin)
    }

    pub fn default_preferences() -> HashMap<String, serde_json::Value> {
        let mut prefs = HashMap::new();
        prefs.insert("timezone".to_string(), serde_json::json!("UTC"));
        prefs.insert("email_notifications".to_string(), serde_json::json!(true));
        prefs.insert("slack_notifications".to_string(), serde_json::json!(false));
        prefs.insert("dashboard_layout".to_string(), serde_json::json!("default"));
        prefs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readonly_is_exclusive() {
        assert!(Role::ReadOnly.exclusive());
        assert!(!Role::OrgOwner.exclusive());
    }
}
