//! Request shell: composes Auth -> Tenancy -> Quota ->
//! Permission -> Session -> route -> Session -> envelope around every
//! endpoint in the logical surface. Implemented as a `tower::Service` over
//! framework-agnostic `ApiRequest`/`ApiResponse` types so the pipeline is
//! testable without a socket; the `hyper` wiring lives only in `server.rs`.

use chrono::Utc;
use nexus_core::{
    FailureEnvelope, NexusError, NexusResult, PartialTenantContext, Role, SuccessEnvelope,
    TenantContext, User,
};
use nexus_permissions::{allowed, Action, ResourceKind};
use nexus_runtime::{AgentInput, TemplateType};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// A framework-agnostic request: the server layer (`server.rs`) is the only
/// place that knows about `hyper` types, so `RequestShell` stays testable
/// without spinning up a real socket.
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Value,
}

pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

pub struct RequestShell {
    ctx: Arc<AppContext>,
}

impl RequestShell {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle(&self, req: ApiRequest) -> ApiResponse {
        let path_owned = req.path.clone();
        match self.route(req).await {
            Ok((status, data, tenant_context)) => {
                let envelope = SuccessEnvelope {
                    data,
                    tenant_context,
                    metadata: Default::default(),
                };
                ApiResponse {
                    status,
                    body: serde_json::to_value(envelope).unwrap_or_else(|_| json!({})),
                }
            }
            Err((err, ctx)) => {
                warn!(path = %path_owned, error = %err, "request failed");
                let envelope = FailureEnvelope::from_error(&err, ctx);
                ApiResponse {
                    status: err.http_status(),
                    body: serde_json::to_value(envelope).unwrap_or_else(|_| json!({})),
                }
            }
        }
    }

    /// Resolves the bearer token (if present) into the caller's full user
    /// record, charges one `ApiCallsPerHour` unit, and hands back both —
    /// the common prefix of Auth -> Tenancy -> Quota every authenticated
    /// route needs before permission evaluation.
    async fn authenticate(&self, bearer: Option<&str>) -> NexusResult<User> {
        let token = bearer.ok_or(NexusError::InvalidToken)?;
        let claims = self.ctx.auth.verify_access_token(token)?;
        let user = self.ctx.auth.get_user(&claims.user_id).await?;
        self.ctx
            .quota
            .check_and_consume(&user.org_id, nexus_core::QuotaResource::ApiCallsPerHour, 1)
            .await?;
        Ok(user)
    }

    fn require_permission(
        &self,
        user: &User,
        target_org_id: Option<&str>,
        resource: ResourceKind,
        action: Action,
    ) -> NexusResult<()> {
        let permissions = nexus_auth::permissions_for_roles(&user.roles);
        let target_org_id = target_org_id.map(|s| s.to_string());
        let decision = allowed(user, &permissions, target_org_id.as_ref(), resource, action);
        if decision.allow {
            if decision.reason == "super_admin_bypass" {
                info!(user_id = %user.user_id, resource = ?resource, action = ?action, "super admin bypass");
            }
            Ok(())
        } else {
            Err(NexusError::Forbidden(decision.reason))
        }
    }

    fn tenant_context_for(user: &User) -> TenantContext {
        TenantContext {
            org_id: user.org_id.clone(),
            user_id: user.user_id.clone(),
            timestamp: Some(Utc::now()),
        }
    }

    fn partial_context(user: Option<&User>) -> PartialTenantContext {
        match user {
            Some(u) => PartialTenantContext {
                org_id: Some(u.org_id.clone()),
                user_id: Some(u.user_id.clone()),
            },
            None => PartialTenantContext::default(),
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn route(
        &self,
        req: ApiRequest,
    ) -> Result<(u16, Value, TenantContext), (NexusError, PartialTenantContext)> {
        let segments: Vec<&str> = req.path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();

        // Public routes: no bearer token required.
        match (req.method, segments.as_slice()) {
            (Method::Post, ["auth", "register"]) => {
                return self.handle_register(&req.body).await.map_err(|e| (e, PartialTenantContext::default()));
            }
            (Method::Post, ["auth", "login"]) => {
                return self.handle_login(&req.body).await.map_err(|e| (e, PartialTenantContext::default()));
            }
            (Method::Post, ["auth", "refresh"]) => {
                return self.handle_refresh(&req.body).await.map_err(|e| (e, PartialTenantContext::default()));
            }
            _ => {}
        }

        let user = self
            .authenticate(req.bearer.as_deref())
            .await
            .map_err(|e| (e, PartialTenantContext::default()))?;
        let tenant_context = Self::tenant_context_for(&user);
        let wrap_err = |e: NexusError| (e, Self::partial_context(Some(&user)));

        let (status, data) = match (req.method, segments.as_slice()) {
            (Method::Post, ["auth", "logout"]) => {
                self.handle_logout(&req, &user).map_err(wrap_err)?
            }
            (Method::Post, ["auth", "change-password"]) => {
                self.handle_change_password(&req.body, &user).await.map_err(wrap_err)?
            }
            (Method::Get, ["auth", "profile"]) => self.handle_profile(&user).await.map_err(wrap_err)?,
            (Method::Post, ["chat"]) => self.handle_chat(&req.body, &user).await.map_err(wrap_err)?,
            (Method::Get, ["chat", "history"]) => {
                self.handle_chat_history(&req.body, &user).await.map_err(wrap_err)?
            }
            (Method::Delete, ["chat", "history"]) => {
                self.handle_chat_clear(&req.body, &user).await.map_err(wrap_err)?
            }
            (Method::Post, ["workflow", "start"]) => {
                self.require_permission(&user, None, ResourceKind::Workflow, Action::Create)
                    .map_err(wrap_err)?;
                self.handle_workflow_start(&req.body, &user).await.map_err(wrap_err)?
            }
            (Method::Post, ["workflow", workflow_id, "continue"]) => {
                self.handle_workflow_continue(workflow_id, &req.body, &user)
                    .await
                    .map_err(wrap_err)?
            }
            (Method::Post, ["workflow", workflow_id, "approve"]) => {
                self.require_permission(&user, None, ResourceKind::Workflow, Action::Approve)
                    .map_err(wrap_err)?;
                self.handle_workflow_approve(workflow_id, &req.body, &user)
                    .await
                    .map_err(wrap_err)?
            }
            (Method::Get, ["workflow", workflow_id]) => {
                self.require_permission(&user, None, ResourceKind::Workflow, Action::View)
                    .map_err(wrap_err)?;
                self.handle_workflow_status(workflow_id, &user).await.map_err(wrap_err)?
            }
            (Method::Get, ["agents", "status"]) => {
                self.require_permission(&user, None, ResourceKind::Agent, Action::View)
                    .map_err(wrap_err)?;
                self.handle_agents_status().map_err(wrap_err)?
            }
            (Method::Get, ["features", org_id]) => {
                self.require_permission(&user, Some(org_id), ResourceKind::FeatureFlag, Action::View)
                    .map_err(wrap_err)?;
                self.handle_features_get(org_id, &user).await.map_err(wrap_err)?
            }
            (Method::Post, ["features", org_id, feature]) => {
                self.require_permission(&user, Some(org_id), ResourceKind::FeatureFlag, Action::Manage)
                    .map_err(wrap_err)?;
                self.handle_features_toggle(org_id, feature, &req.body).map_err(wrap_err)?
            }
            (Method::Get, ["customer-success", "analytics", org_id]) => {
                self.require_permission(&user, Some(org_id), ResourceKind::Analytics, Action::View)
                    .map_err(wrap_err)?;
                self.handle_analytics(org_id).await.map_err(wrap_err)?
            }
            _ => return Err((NexusError::NotFound(req.path.clone()), Self::partial_context(Some(&user)))),
        };

        Ok((status, data, tenant_context))
    }

    // -- auth -----------------------------------------------------------

    async fn handle_register(&self, body: &Value) -> NexusResult<(u16, Value)> {
        let org_name = body_str(body, "org_name")?;
        let domain = body_str(body, "domain")?;
        let email = body_str(body, "email")?;
        let username = body_str(body, "username")?;
        let full_name = body_str(body, "full_name")?;
        let password = body_str(body, "password")?;

        let org = self
            .ctx
            .tenancy
            .create_organization(org_name, domain, nexus_core::PlanType::Starter, String::new(), email)
            .await?;
        let user = self
            .ctx
            .auth
            .register(&org.org_id, email, username, full_name, password, vec![Role::OrgOwner])
            .await?;
        self.ctx.onboarding.initialize(org.org_id.clone()).await?;
        Ok((201, json!({ "org_id": org.org_id, "user_id": user.user_id })))
    }

    async fn handle_login(&self, body: &Value) -> NexusResult<(u16, Value)> {
        let email = body_str(body, "email")?;
        let password = body_str(body, "password")?;
        let mfa_code = body.get("mfa_code").and_then(Value::as_u64).map(|v| v as u32);
        let pair = self.ctx.auth.login(email, password, mfa_code).await?;
        Ok((200, json!({ "access_token": pair.access_token, "refresh_token": pair.refresh_token })))
    }

    async fn handle_refresh(&self, body: &Value) -> NexusResult<(u16, Value)> {
        let refresh_token = body_str(body, "refresh_token")?;
        let pair = self.ctx.auth.refresh(refresh_token).await?;
        Ok((200, json!({ "access_token": pair.access_token, "refresh_token": pair.refresh_token })))
    }

    fn handle_logout(&self, req: &ApiRequest, _user: &User) -> NexusResult<(u16, Value)> {
        let refresh_token = req.body.get("refresh_token").and_then(Value::as_str);
        self.ctx.auth.logout(req.bearer.as_deref().unwrap_or_default(), refresh_token)?;
        Ok((200, json!({ "logged_out": true })))
    }

    async fn handle_change_password(&self, body: &Value, user: &User) -> NexusResult<(u16, Value)> {
        let current = body_str(body, "current_password")?;
        let new = body_str(body, "new_password")?;
        self.ctx.auth.change_password(&user.user_id, current, new).await?;
        Ok((200, json!({ "changed": true })))
    }

    async fn handle_profile(&self, user: &User) -> NexusResult<(u16, Value)> {
        let tenant_context = self.ctx.get_tenant_context(&user.user_id).await?;
        Ok((200, serde_json::to_value(tenant_context).unwrap_or_default()))
    }

    // -- chat -------------------------------------------------------------

    async fn handle_chat(&self, body: &Value, user: &User) -> NexusResult<(u16, Value)> {
        let message = body_str(body, "message")?;
        let agent_name = body_str(body, "agent_name")?;
        let session_id = body.get("session_id").and_then(Value::as_str);

        let session = self.ctx.sessions.get_or_create(user, session_id).await?;
        let deadline = std::time::Duration::from_secs(self.ctx.config.request_timeout_secs);
        let output = self
            .ctx
            .dispatcher
            .invoke(
                &user.org_id,
                agent_name,
                AgentInput::new(message),
                deadline,
                tokio_util::sync::CancellationToken::new(),
            )
            .await?;

        let summary = output
            .summary_fields()
            .and_then(Value::as_str)
            .unwrap_or(&output.message)
            .to_string();
        self.ctx
            .sessions
            .append(&session.session_id, agent_name, message, &summary)
            .await?;

        Ok((
            200,
            json!({
                "session_id": session.session_id,
                "message": output.message,
                "agent_name": output.agent_name,
                "intent": output.intent,
                "confidence": output.confidence,
                "real_execution": output.real_execution,
            }),
        ))
    }

    async fn handle_chat_history(&self, body: &Value, user: &User) -> NexusResult<(u16, Value)> {
        let session_id = body_str(body, "session_id")?;
        let session = self.ctx.sessions.get_or_create(user, Some(session_id)).await?;
        let history = self.ctx.sessions.history(&session.session_id, None).await?;
        Ok((200, json!({ "history": history })))
    }

    async fn handle_chat_clear(&self, body: &Value, user: &User) -> NexusResult<(u16, Value)> {
        let session_id = body_str(body, "session_id")?;
        self.ctx.sessions.get_or_create(user, Some(session_id)).await?;
        self.ctx.sessions.clear(session_id).await?;
        Ok((200, json!({ "cleared": true })))
    }

    // -- workflows --------------------------------------------------------

    async fn handle_workflow_start(&self, body: &Value, user: &User) -> NexusResult<(u16, Value)> {
        let message = body_str(body, "message")?;
        let template_type = match body.get("template_type").and_then(Value::as_str) {
            Some(explicit) => parse_template_type(explicit)?,
            None => nexus_runtime::detect_template(message)
                .ok_or_else(|| NexusError::InvalidInput("could not detect a workflow template from message".into()))?,
        };
        let context: HashMap<String, Value> = body
            .get("context")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let instance = self
            .ctx
            .workflows
            .start(user.org_id.clone(), user.user_id.clone(), template_type, message.to_string(), context)
            .await?;

        let session_id = body.get("session_id").and_then(Value::as_str);
        self.sync_session_workflow(session_id, user, &instance.workflow_id, instance.status).await;

        Ok((201, serde_json::to_value(&instance).unwrap_or_default()))
    }

    async fn handle_workflow_continue(&self, workflow_id: &str, body: &Value, user: &User) -> NexusResult<(u16, Value)> {
        let instance = self.ctx.workflows.continue_(workflow_id).await?;
        self.check_workflow_org(&instance, user)?;

        let session_id = body.get("session_id").and_then(Value::as_str);
        self.sync_session_workflow(session_id, user, workflow_id, instance.status).await;

        Ok((200, Self::augment_with_workflow_context(&instance)))
    }

    /// Builds the augmented response envelope a successful `continue` call
    /// returns: the serialized instance plus `workflow_context` (progress
    /// through the template) and the fixed set of actions a caller can take
    /// next.
    fn augment_with_workflow_context(instance: &nexus_runtime::WorkflowInstance) -> Value {
        let template = nexus_runtime::builtin_template(instance.template_type);
        let total = template.steps.len();
        let completed = instance.current_step_index.min(total);
        let step_name = instance.results.last().map(|r| r.step_name.clone());
        let next_step_name = template.steps.get(instance.current_step_index).map(|s| s.display_name.clone());
        let progress_percent = if total == 0 { 100.0 } else { (completed as f64 / total as f64) * 100.0 };

        let mut value = serde_json::to_value(instance).unwrap_or_default();
        if let Value::Object(ref mut map) = value {
            map.insert(
                "workflow_context".into(),
                json!({
                    "workflow_id": instance.workflow_id,
                    "step": format!("{completed}/{total}"),
                    "step_name": step_name,
                    "next_step_name": next_step_name,
                    "progress_percent": progress_percent,
                }),
            );
            map.insert("suggested_actions".into(), json!(["continue", "pause", "status"]));
        }
        value
    }

    async fn handle_workflow_approve(&self, workflow_id: &str, body: &Value, user: &User) -> NexusResult<(u16, Value)> {
        let action = body.get("action").and_then(Value::as_str).unwrap_or("approve");
        let instance = self.ctx.workflows.status(workflow_id).await?;
        self.check_workflow_org(&instance, user)?;

        let instance = match action {
            "approve" => self.ctx.workflows.approve(workflow_id).await?,
            "reject" => self.ctx.workflows.reject(workflow_id).await?,
            "pause" => self.ctx.workflows.pause(workflow_id).await?,
            "cancel" => self.ctx.workflows.cancel(workflow_id).await?,
            other => return Err(NexusError::InvalidInput(format!("unknown approval action `{other}`"))),
        };

        let session_id = body.get("session_id").and_then(Value::as_str);
        self.sync_session_workflow(session_id, user, workflow_id, instance.status).await;

        Ok((200, serde_json::to_value(&instance).unwrap_or_default()))
    }

    /// Rebuilds a session's `current_workflow_id`/`pending_approvals`
    /// against a workflow's latest status. Best-effort: a caller that
    /// doesn't pass `session_id` (or passes one belonging to a different
    /// user) simply isn't tracked, since workflow instances outlive their
    /// creating session and are addressable without one.
    async fn sync_session_workflow(
        &self,
        session_id: Option<&str>,
        user: &User,
        workflow_id: &str,
        status: nexus_runtime::WorkflowStatus,
    ) {
        let Some(session_id) = session_id else { return };
        if self.ctx.sessions.get_or_create(user, Some(session_id)).await.is_err() {
            return;
        }
        let waiting_approval = matches!(status, nexus_runtime::WorkflowStatus::WaitingApproval);
        let _ = self
            .ctx
            .sessions
            .sync_workflow_state(session_id, workflow_id, waiting_approval, status.is_terminal())
            .await;
    }

    async fn handle_workflow_status(&self, workflow_id: &str, user: &User) -> NexusResult<(u16, Value)> {
        let instance = self.ctx.workflows.status(workflow_id).await?;
        self.check_workflow_org(&instance, user)?;
        Ok((200, serde_json::to_value(&instance).unwrap_or_default()))
    }

    fn check_workflow_org(&self, instance: &nexus_runtime::WorkflowInstance, user: &User) -> NexusResult<()> {
        if instance.org_id != user.org_id {
            return Err(NexusError::Forbidden("workflow belongs to a different organization".into()));
        }
        Ok(())
    }

    // -- agents, features, analytics --------------------------------------

    fn handle_agents_status(&self) -> NexusResult<(u16, Value)> {
        let agents: Vec<_> = self
            .ctx
            .agents
            .list()
            .into_iter()
            .map(|d| {
                json!({
                    "agent_name": d.agent_name,
                    "category": d.category,
                    "capabilities": d.capabilities,
                })
            })
            .collect();
        Ok((200, json!({ "agents": agents, "count": agents.len() })))
    }

    async fn handle_features_get(&self, org_id: &str, user: &User) -> NexusResult<(u16, Value)> {
        let org = self.ctx.tenancy.get_organization(org_id).await?;
        let onboarding = self.ctx.onboarding.status(org_id).await.ok();
        let _ = user;
        Ok((
            200,
            json!({
                "org_id": org_id,
                "plan_type": org.plan_type,
                "onboarding": onboarding,
            }),
        ))
    }

    fn handle_features_toggle(&self, org_id: &str, feature: &str, body: &Value) -> NexusResult<(u16, Value)> {
        let enabled = body.get("enabled").and_then(Value::as_bool).unwrap_or(true);
        self.ctx.flags.set_override(org_id, feature, enabled);
        Ok((200, json!({ "org_id": org_id, "feature": feature, "enabled": enabled })))
    }

    async fn handle_analytics(&self, org_id: &str) -> NexusResult<(u16, Value)> {
        let summary = self.ctx.tenancy.tenant_summary(org_id).await?;
        Ok((200, serde_json::to_value(summary).unwrap_or_default()))
    }
}

fn body_str<'a>(body: &'a Value, field: &str) -> NexusResult<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| NexusError::InvalidInput(format!("missing field `{field}`")))
}

fn parse_template_type(s: &str) -> NexusResult<TemplateType> {
    match s {
        "cost_optimization" => Ok(TemplateType::CostOptimization),
        "security_hardening" => Ok(TemplateType::SecurityHardening),
        "deployment" => Ok(TemplateType::Deployment),
        "incident_response" => Ok(TemplateType::IncidentResponse),
        "compliance_audit" => Ok(TemplateType::ComplianceAudit),
        "ml_model_lifecycle" => Ok(TemplateType::MlModelLifecycle),
        other => Err(NexusError::InvalidInput(format!("unknown workflow template `{other}`"))),
    }
}
