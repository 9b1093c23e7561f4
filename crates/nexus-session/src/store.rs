//! Session store: `get_or_create`, `append` (history capped with
//! oldest-first truncation, favorite agents by usage count, a digest of
//! the last 5 entries), `suggest_next` for contextual follow-ups, and an
//! idle sweep.

use chrono::{DateTime, Utc};
use nexus_core::{ids, NexusError, NexusResult, OrgId, SessionId, Store, User, UserId};
use std::sync::Arc;

use crate::model::{ConversationEntry, Session};

const SESSION_PREFIX: &str = "session:";
const RECENT_AGENTS_CAP: usize = 10;
const RECENT_TOPICS_CAP: usize = 15;
const SUMMARY_WINDOW: usize = 5;

pub struct SessionStore {
    store: Arc<dyn Store>,
    history_cap: usize,
}

impl SessionStore {
    pub fn new(store: Arc<dyn Store>, history_cap: usize) -> Self {
        Self { store, history_cap }
    }

    fn key(session_id: &str) -> String {
        format!("{SESSION_PREFIX}{session_id}")
    }

    async fn put(&self, session: &Session) -> NexusResult<()> {
        let bytes = serde_json::to_vec(session)
            .map_err(|e| NexusError::internal(format!("failed to encode session: {e}")))?;
        self.store.put(&Self::key(&session.session_id), bytes).await
    }

    pub async fn get(&self, session_id: &str) -> NexusResult<Option<Session>> {
        match self.store.get(&Self::key(session_id)).await? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| NexusError::internal(format!("corrupt session record: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    /// Creates a new session for `user_id` if `session_id` is `None` or
    /// unknown; otherwise returns the existing one, rejecting it if it
    /// belongs to a different user's organization (tenant isolation:
    /// a session's `org_id` must always match its owning user's).
    pub async fn get_or_create(&self, user: &User, session_id: Option<&str>) -> NexusResult<Session> {
        if let Some(session_id) = session_id {
            if let Some(session) = self.get(session_id).await? {
                if session.org_id != user.org_id || session.user_id != user.user_id {
                    return Err(NexusError::Forbidden(
                        "session does not belong to this user's organization".into(),
                    ));
                }
                return Ok(session);
            }
        }
        let session = Session::new(ids::new_id("sess"), user.user_id.clone(), user.org_id.clone());
        self.put(&session).await?;
        Ok(session)
    }

    pub async fn append(
        &self,
        session_id: &str,
        agent_name: &str,
        input: &str,
        result_summary: &str,
    ) -> NexusResult<Session> {
        let mut session = self
            .get(session_id)
            .await?
            .ok_or_else(|| NexusError::not_found(format!("session {session_id}")))?;

        session.conversation_history.push(ConversationEntry {
            agent_name: agent_name.to_string(),
            input: input.to_string(),
            result_summary: result_summary.to_string(),
            timestamp: Utc::now(),
        });
        if session.conversation_history.len() > self.history_cap {
            let overflow = session.conversation_history.len() - self.history_cap;
            session.conversation_history.drain(0..overflow);
        }

        move_to_front(&mut session.context.recent_agents, agent_name.to_string(), RECENT_AGENTS_CAP);
        *session.context.favorite_agents.entry(agent_name.to_string()).or_insert(0) += 1;

        if let Some(topic) = extract_topic(input) {
            move_to_front(&mut session.context.recent_topics, topic, RECENT_TOPICS_CAP);
        }

        session.context.summary = summarize(&session.conversation_history);
        session.last_active_at = Utc::now();

        self.put(&session).await?;
        Ok(session)
    }

    /// Reconciles `current_workflow_id`/`pending_approvals` against a
    /// workflow's latest known status (the `SessionContext` is described
    /// as "derived, rebuilt on each turn" — this is that rebuild,
    /// triggered whenever the request shell starts, resumes, or checks a
    /// workflow on behalf of a session). `is_waiting_approval` should
    /// reflect `WorkflowStatus::WaitingApproval`; any other status clears
    /// the workflow from `pending_approvals` and, once terminal, from
    /// `current_workflow_id` too.
    pub async fn sync_workflow_state(
        &self,
        session_id: &str,
        workflow_id: &str,
        is_waiting_approval: bool,
        is_terminal: bool,
    ) -> NexusResult<()> {
        let mut session = self
            .get(session_id)
            .await?
            .ok_or_else(|| NexusError::not_found(format!("session {session_id}")))?;

        if is_terminal {
            if session.context.current_workflow_id.as_deref() == Some(workflow_id) {
                session.context.current_workflow_id = None;
            }
        } else {
            session.context.current_workflow_id = Some(workflow_id.to_string());
        }

        session.context.pending_approvals.retain(|w| w != workflow_id);
        if is_waiting_approval {
            session.context.pending_approvals.push(workflow_id.to_string());
        }

        self.put(&session).await
    }

    pub async fn history(&self, session_id: &str, limit: Option<usize>) -> NexusResult<Vec<ConversationEntry>> {
        let session = self
            .get(session_id)
            .await?
            .ok_or_else(|| NexusError::not_found(format!("session {session_id}")))?;
        let history = session.conversation_history;
        Ok(match limit {
            Some(n) if n < history.len() => history[history.len() - n..].to_vec(),
            _ => history,
        })
    }

    pub async fn clear(&self, session_id: &str) -> NexusResult<()> {
        let mut session = self
            .get(session_id)
            .await?
            .ok_or_else(|| NexusError::not_found(format!("session {session_id}")))?;
        session.conversation_history.clear();
        session.context = Default::default();
        self.put(&session).await
    }

    /// Top-N favorite agents by usage count.
    pub async fn favorite_agents(&self, session_id: &str, top_n: usize) -> NexusResult<Vec<String>> {
        let session = self
            .get(session_id)
            .await?
            .ok_or_else(|| NexusError::not_found(format!("session {session_id}")))?;
        let mut ranked: Vec<_> = session.context.favorite_agents.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().take(top_n).map(|(name, _)| name).collect())
    }

    /// Suggests what to try next based on the most recently discussed
    /// topic. Non-load-bearing: a fixed fallback list is returned if no
    /// topic has been detected yet.
    pub fn suggest_next(&self, session: &Session) -> Vec<String> {
        match session.context.recent_topics.first().map(String::as_str) {
            Some(topic) => topic_suggestions(topic),
            None => default_suggestions(),
        }
    }

    /// Clears conversation state (but not the session record itself) for
    /// sessions idle longer than `idle_ttl` (24h by default).
    pub async fn purge_idle(&self, idle_ttl: chrono::Duration, now: DateTime<Utc>) -> NexusResult<usize> {
        let mut purged = 0;
        for (key, bytes) in self.store.scan(SESSION_PREFIX).await? {
            let Ok(session) = serde_json::from_slice::<Session>(&bytes) else { continue };
            if session.idle_for(now) > idle_ttl {
                self.store.delete(&key).await?;
                purged += 1;
            }
        }
        Ok(purged)
    }
}

fn move_to_front<T: PartialEq>(list: &mut Vec<T>, item: T, cap: usize) {
    list.retain(|x| *x != item);
    list.insert(0, item);
    list.truncate(cap);
}

fn summarize(history: &[ConversationEntry]) -> String {
    let recent = &history[history.len().saturating_sub(SUMMARY_WINDOW)..];
    recent
        .iter()
        .map(|e| format!("{}: {}", e.agent_name, e.result_summary))
        .collect::<Vec<_>>()
        .join(" | ")
}

const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("cost", &["cost", "spend", "budget", "billing"]),
    ("security", &["security", "vulnerability", "compliance", "audit"]),
    ("performance", &["performance", "latency", "slow", "bottleneck"]),
    ("deployment", &["deploy", "release", "rollout", "pipeline"]),
    ("monitoring", &["monitor", "alert", "incident", "dashboard"]),
];

fn extract_topic(input: &str) -> Option<String> {
    let lowered = input.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(topic, _)| topic.to_string())
}

fn topic_suggestions(topic: &str) -> Vec<String> {
    match topic {
        "cost" => vec!["Run a cost optimization pass".into(), "Review idle resources".into()],
        "security" => vec!["Run a security hardening scan".into(), "Review recent access changes".into()],
        "performance" => vec!["Check latency dashboards".into(), "Profile the slowest endpoints".into()],
        "deployment" => vec!["Review the last rollout".into(), "Check deployment health checks".into()],
        "monitoring" => vec!["Review open alerts".into(), "Check on-call dashboard".into()],
        _ => default_suggestions(),
    }
}

fn default_suggestions() -> Vec<String> {
    vec![
        "Start a cost optimization workflow".into(),
        "Check system health".into(),
        "Review recent workflows".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{MemoryStore, PasswordHash, Role};

    fn user(user_id: &str, org_id: &str) -> User {
        User {
            user_id: user_id.to_string(),
            email: format!("{user_id}@example.com"),
            username: user_id.to_string(),
            full_name: "Test".into(),
            password_hash: PasswordHash { kdf_name: "argon2id".into(), iterations: 1, salt: "s".into(), hash: "h".into() },
            org_id: org_id.to_string(),
            team_ids: vec![],
            roles: vec![Role::OrgOwner],
            mfa_enrolled: false,
            mfa_secret: None,
            mfa_backup_codes: vec![],
            active: true,
            created_at: Utc::now(),
            last_login_at: None,
            preferences: Default::default(),
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), 50)
    }

    #[tokio::test]
    async fn get_or_create_makes_a_new_session_then_reuses_it() {
        let store = store();
        let u = user("u1", "org_1");
        let session = store.get_or_create(&u, None).await.unwrap();
        let again = store.get_or_create(&u, Some(&session.session_id)).await.unwrap();
        assert_eq!(session.session_id, again.session_id);
    }

    #[tokio::test]
    async fn rejects_session_from_a_different_org() {
        let store = store();
        let u1 = user("u1", "org_1");
        let u2 = user("u2", "org_2");
        let session = store.get_or_create(&u1, None).await.unwrap();
        let err = store.get_or_create(&u2, Some(&session.session_id)).await.unwrap_err();
        assert!(matches!(err, NexusError::Forbidden(_)));
    }

    #[tokio::test]
    async fn history_caps_and_truncates_oldest_first() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()), 3);
        let u = user("u1", "org_1");
        let session = store.get_or_create(&u, None).await.unwrap();
        for i in 0..5 {
            store.append(&session.session_id, "cost_agent", &format!("q{i}"), "ok").await.unwrap();
        }
        let history = store.history(&session.session_id, None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].input, "q2");
    }

    #[tokio::test]
    async fn recent_agents_moves_to_front_and_caps() {
        let store = store();
        let u = user("u1", "org_1");
        let session = store.get_or_create(&u, None).await.unwrap();
        store.append(&session.session_id, "a", "cost stuff", "ok").await.unwrap();
        store.append(&session.session_id, "b", "other", "ok").await.unwrap();
        let updated = store.append(&session.session_id, "a", "more cost", "ok").await.unwrap();
        assert_eq!(updated.context.recent_agents, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(updated.context.favorite_agents["a"], 2);
    }

    #[tokio::test]
    async fn topic_detection_drives_suggestions() {
        let store = store();
        let u = user("u1", "org_1");
        let session = store.get_or_create(&u, None).await.unwrap();
        let updated = store
            .append(&session.session_id, "cost_agent", "help me reduce cloud spend", "ok")
            .await
            .unwrap();
        let suggestions = store.suggest_next(&updated);
        assert!(suggestions.iter().any(|s| s.to_lowercase().contains("cost")));
    }

    #[tokio::test]
    async fn purge_idle_removes_old_sessions_only() {
        let backing = Arc::new(MemoryStore::new());
        let store = SessionStore::new(backing, 50);
        let u = user("u1", "org_1");
        let fresh = store.get_or_create(&u, None).await.unwrap();

        let mut stale = Session::new("stale_1".into(), "u1".into(), "org_1".into());
        stale.last_active_at = Utc::now() - chrono::Duration::hours(48);
        store.put(&stale).await.unwrap();

        let purged = store.purge_idle(chrono::Duration::hours(24), Utc::now()).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get(&fresh.session_id).await.unwrap().is_some());
        assert!(store.get("stale_1").await.unwrap().is_none());
    }
}
