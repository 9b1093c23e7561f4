//! Permission evaluator: a pure function from a user's resolved
//! permission set to an allow/deny decision for a `(resource_kind, action)`
//! pair, driven by a declarative role -> permission grant table and a
//! resource-kind -> required-permissions table.

use nexus_core::{OrgId, Role, User};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Organization,
    Team,
    Agent,
    Workflow,
    Session,
    FeatureFlag,
    Billing,
    Analytics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    Approve,
    Manage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    pub reason: String,
}

impl Decision {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allow: true, reason: reason.into() }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { allow: false, reason: reason.into() }
    }
}

/// Any one of these permission strings is sufficient (an any-of table, not
/// all-of): a resource kind may be reachable by more than one role, and a
/// caller only needs to hold one of the listed permissions.
fn required_permissions(resource: ResourceKind, action: Action) -> &'static [&'static str] {
    use Action::*;
    use ResourceKind::*;
    match (resource, action) {
        (Organization, View) => &["view_org_analytics", "manage_org"],
        (Organization, Update | Manage) => &["manage_org"],
        (Organization, Delete) => &["manage_org"],
        (Organization, Create | Approve) => &[],

        (Team, View) => &["manage_team", "create_workflows", "manage_agents"],
        (Team, Create | Update | Manage) => &["manage_team"],
        (Team, Delete) => &["manage_team", "manage_org"],
        (Team, Approve) => &["manage_team"],

        (Agent, View) => &["view_agents", "manage_agents"],
        (Agent, Create | Update | Manage) => &["manage_agents"],
        (Agent, Delete) => &["manage_agents", "manage_org"],
        (Agent, Approve) => &["manage_agents"],

        (Workflow, View) => &["view_workflows", "create_workflows"],
        (Workflow, Create | Update | Manage) => &["create_workflows"],
        (Workflow, Delete) => &["create_workflows", "manage_org"],
        (Workflow, Approve) => &["create_workflows", "manage_team"],

        (Session, View | Update | Create | Manage) => &[],
        (Session, Delete) => &["manage_team"],
        (Session, Approve) => &[],

        (FeatureFlag, View) => &["view_org_analytics", "manage_org"],
        (FeatureFlag, Create | Update | Delete | Manage | Approve) => &["manage_org"],

        (Billing, View | Update | Manage) => &["manage_billing"],
        (Billing, Create | Delete | Approve) => &["manage_billing"],

        (Analytics, View) => &["view_org_analytics", "manage_org"],
        (Analytics, Create | Update | Delete | Manage | Approve) => &["manage_org"],
    }
}

/// Evaluates whether `user` (carrying `permissions`, their pre-resolved
/// role-derived permission strings — see `nexus_auth::permissions_for_roles`)
/// may perform `action` on `resource`, optionally scoped to `target_org_id`.
///
/// `SuperAdmin` bypasses every check, but the bypass is itself the
/// decision's reason so request-shell logging can flag it ("a
/// SuperAdmin bypass must be observable, not silent").
pub fn allowed(
    user: &User,
    permissions: &[String],
    target_org_id: Option<&OrgId>,
    resource: ResourceKind,
    action: Action,
) -> Decision {
    if user.has_role(Role::SuperAdmin) {
        return Decision::allow("super_admin_bypass");
    }

    if let Some(target_org_id) = target_org_id {
        if target_org_id != &user.org_id {
            return Decision::deny("cross-tenant access is never permitted regardless of role");
        }
    }

    if user.has_role(Role::ReadOnly) && !matches!(action, Action::View) {
        return Decision::deny("read_only role is restricted to view actions");
    }

    let required = required_permissions(resource, action);
    if required.is_empty() {
        return Decision::allow("no permission required for this action");
    }
    if required.iter().any(|p| permissions.iter().any(|g| g == "*" || g == p)) {
        return Decision::allow("matched a granted permission");
    }
    Decision::deny(format!(
        "requires one of {:?}, user has {:?}",
        required, permissions
    ))
}
