//! Password hashing and policy enforcement, backed by argon2id.

use argon2::password_hash::{PasswordHash as Argon2Hash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use nexus_core::{NexusError, NexusResult, PasswordHash, PasswordPolicy};
use rand::rngs::OsRng;

pub fn check_policy(policy: &PasswordPolicy, password: &str) -> NexusResult<()> {
    if password.len() < policy.min_length {
        return Err(NexusError::WeakPassword(format!(
            "must be at least {} characters",
            policy.min_length
        )));
    }
    if policy.require_upper && !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(NexusError::WeakPassword("must contain an uppercase letter".into()));
    }
    if policy.require_lower && !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(NexusError::WeakPassword("must contain a lowercase letter".into()));
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(NexusError::WeakPassword("must contain a digit".into()));
    }
    if policy.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(NexusError::WeakPassword("must contain a special character".into()));
    }
    let lowered = password.to_lowercase();
    if policy.deny_list.iter().any(|d| lowered == *d) {
        return Err(NexusError::WeakPassword("password is too common".into()));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> NexusResult<PasswordHash> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| NexusError::internal(format!("password hashing failed: {e}")))?;
    Ok(PasswordHash {
        kdf_name: "argon2id".to_string(),
        iterations: 1,
        salt: salt.to_string(),
        hash: hash.to_string(),
    })
}

pub fn verify_password(hash: &PasswordHash, password: &str) -> bool {
    let Ok(parsed) = Argon2Hash::new(&hash.hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
