//! Token signing and verification. HMAC-SHA256 over a JSON payload rather
//! than a general JWT library: the claim shape is bespoke (a pre-resolved
//! permissions array), so `sha2`+`hmac`+`subtle` cover the one signing
//! scheme this service needs without a multi-algorithm JWT dependency.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use nexus_core::{NexusError, NexusResult, TokenClaims};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Opaque wire format: `<base64 payload>.<base64 signature>`. Not a JWT
/// (no header segment, no alg negotiation) — the signing secret and
/// algorithm are fixed by deployment config, so there is nothing to
/// negotiate and nothing for a client to downgrade.
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn sign(&self, claims: &TokenClaims) -> NexusResult<String> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| NexusError::internal(format!("failed to encode claims: {e}")))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);
        let sig = self.sign_bytes(payload_b64.as_bytes())?;
        let sig_b64 = URL_SAFE_NO_PAD.encode(sig);
        Ok(format!("{payload_b64}.{sig_b64}"))
    }

    pub fn verify(&self, token: &str) -> NexusResult<TokenClaims> {
        let (payload_b64, sig_b64) = token.split_once('.').ok_or(NexusError::InvalidToken)?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| NexusError::InvalidToken)?;
        let expected = self.sign_bytes(payload_b64.as_bytes())?;
        if expected.ct_eq(&sig).unwrap_u8() != 1 {
            return Err(NexusError::InvalidToken);
        }
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| NexusError::InvalidToken)?;
        serde_json::from_slice(&payload).map_err(|_| NexusError::InvalidToken)
    }

    fn sign_bytes(&self, data: &[u8]) -> NexusResult<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| NexusError::internal(format!("invalid signing key: {e}")))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn sample_claims() -> TokenClaims {
        TokenClaims {
            user_id: "user_1".into(),
            org_id: "org_1".into(),
            team_ids: vec!["team_1".into()],
            roles: vec![nexus_core::Role::OrgOwner],
            permissions: vec!["manage_team".into()],
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
            kind: nexus_core::TokenKind::Access,
            jti: "jti_1".into(),
        }
    }

    #[test]
    fn round_trips_claims() {
        let codec = TokenCodec::new("secret");
        let token = codec.sign(&sample_claims()).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.user_id, "user_1");
    }

    #[test]
    fn rejects_tampered_payload() {
        let codec = TokenCodec::new("secret");
        let token = codec.sign(&sample_claims()).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(codec.verify(&tampered).is_err());
    }

    #[test]
    fn rejects_wrong_secret() {
        let codec = TokenCodec::new("secret");
        let other = TokenCodec::new("different");
        let token = codec.sign(&sample_claims()).unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn rejects_malformed_token() {
        let codec = TokenCodec::new("secret");
        assert!(codec.verify("not-a-token").is_err());
    }
}
