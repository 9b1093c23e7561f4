//! Identity store: user CRUD with email/username secondary indexes, backed
//! by any `nexus_core::Store`. The secondary indexes are explicit maps kept
//! in sync with the primary record so a swap to a real database keeps the
//! same lookup contract.

use dashmap::DashMap;
use nexus_core::{NexusError, NexusResult, Store, User, UserId};
use std::sync::Arc;

const USER_PREFIX: &str = "user:";

pub struct IdentityStore {
    store: Arc<dyn Store>,
    by_email: DashMap<String, UserId>,
    by_username: DashMap<String, UserId>,
}

impl IdentityStore {
    /// Rebuilds the secondary indexes from whatever is already in `store`.
    /// Needed because a `FileStore`/database-backed deployment may restart
    /// with existing data.
    pub async fn load(store: Arc<dyn Store>) -> NexusResult<Self> {
        let by_email = DashMap::new();
        let by_username = DashMap::new();
        for (_, bytes) in store.scan(USER_PREFIX).await? {
            if let Ok(user) = serde_json::from_slice::<User>(&bytes) {
                by_email.insert(user.email.to_lowercase(), user.user_id.clone());
                by_username.insert(user.username.to_lowercase(), user.user_id.clone());
            }
        }
        Ok(Self { store, by_email, by_username })
    }

    fn key(user_id: &str) -> String {
        format!("{USER_PREFIX}{user_id}")
    }

    pub async fn get(&self, user_id: &str) -> NexusResult<Option<User>> {
        match self.store.get(&Self::key(user_id)).await? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| NexusError::internal(format!("corrupt user record: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    pub async fn get_by_email(&self, email: &str) -> NexusResult<Option<User>> {
        let Some(id) = self.by_email.get(&email.to_lowercase()).map(|e| e.clone()) else {
            return Ok(None);
        };
        self.get(&id).await
    }

    pub async fn get_by_username(&self, username: &str) -> NexusResult<Option<User>> {
        let Some(id) = self.by_username.get(&username.to_lowercase()).map(|e| e.clone()) else {
            return Ok(None);
        };
        self.get(&id).await
    }

    /// Inserts a brand new user. Fails if the email or username is already
    /// taken (email uniqueness is global across orgs, not per-tenant — see
    /// DESIGN.md's Open Question decisions).
    pub async fn create(&self, user: User) -> NexusResult<()> {
        let email = user.email.to_lowercase();
        let username = user.username.to_lowercase();
        if self.by_email.contains_key(&email) {
            return Err(NexusError::UserExists(user.email.clone()));
        }
        if self.by_username.contains_key(&username) {
            return Err(NexusError::UserExists(user.username.clone()));
        }
        let bytes = serde_json::to_vec(&user)
            .map_err(|e| NexusError::internal(format!("failed to encode user: {e}")))?;
        self.store.put(&Self::key(&user.user_id), bytes).await?;
        self.by_email.insert(email, user.user_id.clone());
        self.by_username.insert(username, user.user_id);
        Ok(())
    }

    pub async fn update(&self, user: &User) -> NexusResult<()> {
        let bytes = serde_json::to_vec(user)
            .map_err(|e| NexusError::internal(format!("failed to encode user: {e}")))?;
        self.store.put(&Self::key(&user.user_id), bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_core::{MemoryStore, PasswordHash, Role};

    fn sample_user(id: &str, email: &str) -> User {
        User {
            user_id: id.to_string(),
            email: email.to_string(),
            username: id.to_string(),
            full_name: "Test User".to_string(),
            password_hash: PasswordHash {
                kdf_name: "argon2id".into(),
                iterations: 1,
                salt: "s".into(),
                hash: "h".into(),
            },
            org_id: "org_1".to_string(),
            team_ids: vec![],
            roles: vec![Role::OrgOwner],
            mfa_enrolled: false,
            mfa_secret: None,
            mfa_backup_codes: vec![],
            active: true,
            created_at: Utc::now(),
            last_login_at: None,
            preferences: User::default_preferences(),
        }
    }

    #[tokio::test]
    async fn create_then_lookup_by_email_and_username() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let identity = IdentityStore::load(store).await.unwrap();
        identity.create(sample_user("u1", "alice@example.com")).await.unwrap();

        assert!(identity.get_by_email("ALICE@example.com").await.unwrap().is_some());
        assert!(identity.get_by_username("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejects_duplicate_email() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let identity = IdentityStore::load(store).await.unwrap();
        identity.create(sample_user("u1", "alice@example.com")).await.unwrap();
        let err = identity
            .create(sample_user("u2", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::UserExists(_)));
    }

    #[tokio::test]
    async fn reloads_indexes_from_existing_store() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        {
            let identity = IdentityStore::load(store.clone()).await.unwrap();
            identity.create(sample_user("u1", "alice@example.com")).await.unwrap();
        }
        let reloaded = IdentityStore::load(store).await.unwrap();
        assert!(reloaded.get_by_email("alice@example.com").await.unwrap().is_some());
    }
}
