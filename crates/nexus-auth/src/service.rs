//! Authentication service: the operations exposed to the request shell.
//! Composes `IdentityStore`, `CredentialAttemptLog`, `TokenCodec`, and the
//! password/MFA helpers.

use chrono::{Duration, Utc};
use dashmap::DashSet;
use nexus_core::{
    NexusConfig, NexusError, NexusResult, PlanType, Role, TokenClaims, TokenKind, User, UserId,
};
use std::sync::Arc;

use crate::identity::IdentityStore;
use crate::lockout::CredentialAttemptLog;
use crate::mfa;
use crate::password;
use crate::tokens::TokenCodec;

/// Clock skew the verify path tolerates before treating a token as expired
/// (distributed deployments never share a perfectly synced clock).
fn clock_skew() -> Duration {
    Duration::seconds(60)
}

pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Maps a role set to the flat permission strings a token carries
/// pre-resolved, so the permission evaluator never has to re-derive them
/// per request.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<String> {
    let mut perms = std::collections::BTreeSet::new();
    for role in roles {
        let granted: &[&str] = match role {
            Role::SuperAdmin => &["*"],
            Role::OrgOwner => &[
                "manage_org",
                "manage_team",
                "manage_billing",
                "view_org_analytics",
                "create_workflows",
                "manage_agents",
            ],
            Role::OrgAdmin => &[
                "manage_team",
                "view_org_analytics",
                "create_workflows",
                "manage_agents",
            ],
            Role::TeamLead => &["manage_team", "create_workflows", "manage_agents"],
            Role::TeamMember => &["create_workflows", "manage_agents"],
            Role::ReadOnly => &["view_workflows", "view_agents"],
        };
        perms.extend(granted.iter().map(|p| p.to_string()));
    }
    perms.into_iter().collect()
}

pub struct AuthService {
    identity: IdentityStore,
    lockout: CredentialAttemptLog,
    codec: TokenCodec,
    config: NexusConfig,
    /// Revoked `jti`s: logout and (when rotation is enabled) spent refresh
    /// tokens land here. In-memory only; a restart clears revocations, the
    /// same tradeoff the in-memory lockout log makes.
    revoked: Arc<DashSet<String>>,
}

impl AuthService {
    pub fn new(identity: IdentityStore, config: NexusConfig) -> Self {
        let codec = TokenCodec::new(config.token_signing_secret.clone());
        Self {
            identity,
            lockout: CredentialAttemptLog::new(),
            codec,
            config,
            revoked: Arc::new(DashSet::new()),
        }
    }

    pub async fn register(
        &self,
        org_id: &str,
        email: &str,
        username: &str,
        full_name: &str,
        password: &str,
        roles: Vec<Role>,
    ) -> NexusResult<User> {
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(NexusError::InvalidEmail(email.to_string()));
        }
        password::check_policy(&self.config.password_policy, password)?;
        let hash = password::hash_password(password)?;
        let user = User {
            user_id: nexus_core::ids::new_id("user"),
            email: email.to_string(),
            username: username.to_string(),
            full_name: full_name.to_string(),
            password_hash: hash,
            org_id: org_id.to_string(),
            team_ids: vec![],
            roles,
            mfa_enrolled: false,
            mfa_secret: None,
            mfa_backup_codes: vec![],
            active: true,
            created_at: Utc::now(),
            last_login_at: None,
            preferences: User::default_preferences(),
        };
        self.identity.create(user.clone()).await?;
        Ok(user)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        mfa_code: Option<u32>,
    ) -> NexusResult<TokenPair> {
        let now = Utc::now();
        if let Some(retry_after) = self.lockout.check(email, &self.config.lockout, now) {
            return Err(NexusError::RateLimited(format!(
                "too many failed attempts, retry in {}s",
                retry_after.num_seconds().max(0)
            )));
        }

        let Some(user) = self.identity.get_by_email(email).await? else {
            self.lockout.record_failure(email, now);
            return Err(NexusError::InvalidCredentials);
        };

        if !user.active || !password::verify_password(&user.password_hash, password) {
            self.lockout.record_failure(email, now);
            return Err(NexusError::InvalidCredentials);
        }

        if self.config.enforce_mfa && user.mfa_enrolled {
            let Some(secret) = user.mfa_secret.as_deref() else {
                return Err(NexusError::InvalidCredentials);
            };
            let Some(code) = mfa_code else {
                return Err(NexusError::InvalidCredentials);
            };
            if !mfa::verify_totp(secret, now.timestamp().max(0) as u64, code) {
                self.lockout.record_failure(email, now);
                return Err(NexusError::InvalidCredentials);
            }
        }

        self.lockout.clear(email);
        let mut updated = user.clone();
        updated.last_login_at = Some(now);
        self.identity.update(&updated).await?;

        self.mint_pair(&updated)
    }

    fn mint_pair(&self, user: &User) -> NexusResult<TokenPair> {
        let permissions = permissions_for_roles(&user.roles);
        let now = Utc::now();
        let access = TokenClaims {
            user_id: user.user_id.clone(),
            org_id: user.org_id.clone(),
            team_ids: user.team_ids.clone(),
            roles: user.roles.clone(),
            permissions: permissions.clone(),
            issued_at: now,
            expires_at: now + Duration::seconds(self.config.access_token_ttl_secs as i64),
            kind: TokenKind::Access,
            jti: nexus_core::ids::new_id("jti"),
        };
        let refresh = TokenClaims {
            user_id: user.user_id.clone(),
            org_id: user.org_id.clone(),
            team_ids: user.team_ids.clone(),
            roles: user.roles.clone(),
            permissions,
            issued_at: now,
            expires_at: now + Duration::seconds(self.config.refresh_token_ttl_secs as i64),
            kind: TokenKind::Refresh,
            jti: nexus_core::ids::new_id("jti"),
        };
        Ok(TokenPair {
            access_token: self.codec.sign(&access)?,
            refresh_token: self.codec.sign(&refresh)?,
        })
    }

    pub fn verify_access_token(&self, token: &str) -> NexusResult<TokenClaims> {
        let claims = self.codec.verify(token)?;
        if claims.kind != TokenKind::Access {
            return Err(NexusError::InvalidToken);
        }
        if self.revoked.contains(&claims.jti) {
            return Err(NexusError::InvalidToken);
        }
        if claims.is_expired_at(Utc::now(), clock_skew()) {
            return Err(NexusError::TokenExpired);
        }
        Ok(claims)
    }

    pub async fn refresh(&self, refresh_token: &str) -> NexusResult<TokenPair> {
        let claims = self.codec.verify(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(NexusError::InvalidToken);
        }
        if self.revoked.contains(&claims.jti) {
            return Err(NexusError::InvalidToken);
        }
        if claims.is_expired_at(Utc::now(), clock_skew()) {
            return Err(NexusError::TokenExpired);
        }
        let Some(user) = self.identity.get(&claims.user_id).await? else {
            return Err(NexusError::InvalidToken);
        };
        if self.config.rotate_refresh_tokens {
            self.revoked.insert(claims.jti.clone());
        }
        self.mint_pair(&user)
    }

    pub fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> NexusResult<()> {
        if let Ok(claims) = self.codec.verify(access_token) {
            self.revoked.insert(claims.jti);
        }
        if let Some(rt) = refresh_token {
            if let Ok(claims) = self.codec.verify(rt) {
                self.revoked.insert(claims.jti);
            }
        }
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: &UserId,
        current_password: &str,
        new_password: &str,
    ) -> NexusResult<()> {
        let Some(mut user) = self.identity.get(user_id).await? else {
            return Err(NexusError::NotFound(user_id.clone()));
        };
        if !password::verify_password(&user.password_hash, current_password) {
            return Err(NexusError::InvalidCredentials);
        }
        password::check_policy(&self.config.password_policy, new_password)?;
        user.password_hash = password::hash_password(new_password)?;
        self.identity.update(&user).await
    }

    pub async fn mfa_enroll(&self, user_id: &UserId) -> NexusResult<(String, Vec<String>)> {
        let Some(mut user) = self.identity.get(user_id).await? else {
            return Err(NexusError::NotFound(user_id.clone()));
        };
        let secret = mfa::generate_secret();
        let backup_codes = mfa::generate_backup_codes(8);
        user.mfa_secret = Some(secret.clone());
        user.mfa_backup_codes = backup_codes.clone();
        user.mfa_enrolled = false; // confirmed only after a successful mfa_verify
        self.identity.update(&user).await?;
        Ok((secret, backup_codes))
    }

    pub async fn mfa_verify(&self, user_id: &UserId, code: u32) -> NexusResult<()> {
        let Some(mut user) = self.identity.get(user_id).await? else {
            return Err(NexusError::NotFound(user_id.clone()));
        };
        let Some(secret) = user.mfa_secret.as_deref() else {
            return Err(NexusError::InvalidInput("mfa not enrolled".into()));
        };
        let now = Utc::now().timestamp().max(0) as u64;
        if !mfa::verify_totp(secret, now, code) {
            return Err(NexusError::InvalidCredentials);
        }
        user.mfa_enrolled = true;
        self.identity.update(&user).await
    }

    pub fn quota_plan_for(&self, plan: PlanType) -> nexus_core::QuotaMap {
        self.config.quotas_for(plan)
    }

    /// Looks a user up by id. Exposed so the request shell can compose a
    /// full tenant context (org, teams, roles, permissions) from a token's
    /// `user_id` claim without the identity store itself becoming a public
    /// dependency of every downstream crate.
    pub async fn get_user(&self, user_id: &str) -> NexusResult<User> {
        self.identity
            .get(user_id)
            .await?
            .ok_or_else(|| NexusError::NotFound(format!("user {user_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{MemoryStore, Store};

    async fn service() -> AuthService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let identity = IdentityStore::load(store).await.unwrap();
        AuthService::new(identity, NexusConfig::default())
    }

    #[tokio::test]
    async fn register_then_login_succeeds() {
        let auth = service().await;
        auth.register("org_1", "alice@example.com", "alice", "Alice", "Correct-Horse-9", vec![Role::OrgOwner])
            .await
            .unwrap();
        let pair = auth.login("alice@example.com", "Correct-Horse-9", None).await.unwrap();
        let claims = auth.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.org_id, "org_1");
        assert!(claims.permissions.contains(&"manage_org".to_string()));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_and_locks_out_eventually() {
        let auth = service().await;
        auth.register("org_1", "alice@example.com", "alice", "Alice", "Correct-Horse-9", vec![Role::OrgOwner])
            .await
            .unwrap();
        for _ in 0..4 {
            assert!(auth.login("alice@example.com", "wrong", None).await.is_err());
        }
        let err = auth.login("alice@example.com", "wrong", None).await.unwrap_err();
        assert!(matches!(err, NexusError::RateLimited(_)));
    }

    #[tokio::test]
    async fn refresh_mints_new_pair_and_rotates_by_default() {
        let auth = service().await;
        auth.register("org_1", "alice@example.com", "alice", "Alice", "Correct-Horse-9", vec![Role::OrgOwner])
            .await
            .unwrap();
        let pair = auth.login("alice@example.com", "Correct-Horse-9", None).await.unwrap();
        let refreshed = auth.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(pair.access_token, refreshed.access_token);
        assert!(auth.refresh(&pair.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn logout_revokes_access_token() {
        let auth = service().await;
        auth.register("org_1", "alice@example.com", "alice", "Alice", "Correct-Horse-9", vec![Role::OrgOwner])
            .await
            .unwrap();
        let pair = auth.login("alice@example.com", "Correct-Horse-9", None).await.unwrap();
        auth.logout(&pair.access_token, Some(&pair.refresh_token)).unwrap();
        assert!(auth.verify_access_token(&pair.access_token).is_err());
    }

    #[tokio::test]
    async fn mfa_enroll_then_verify_flips_enrolled_flag() {
        let auth = service().await;
        let user = auth
            .register("org_1", "alice@example.com", "alice", "Alice", "Correct-Horse-9", vec![Role::OrgOwner])
            .await
            .unwrap();
        let (secret, _codes) = auth.mfa_enroll(&user.user_id).await.unwrap();
        let now = Utc::now().timestamp().max(0) as u64;
        let code = mfa::totp_at(&secret, now).unwrap();
        auth.mfa_verify(&user.user_id, code).await.unwrap();
        let refreshed = auth.identity.get(&user.user_id).await.unwrap().unwrap();
        assert!(refreshed.mfa_enrolled);
    }

    #[tokio::test]
    async fn rejects_malformed_email() {
        let auth = service().await;
        let err = auth
            .register("org_1", "not-an-email", "alice", "Alice", "Correct-Horse-9", vec![Role::OrgOwner])
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::InvalidEmail(_)));
    }
}
