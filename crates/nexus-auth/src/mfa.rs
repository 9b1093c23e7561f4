//! TOTP (RFC 6238) enrollment and verification. An enrollment hook, not a
//! mandatory gate: whether login actually requires a TOTP code after
//! password verification is governed by `NexusConfig::enforce_mfa`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const STEP_SECS: u64 = 30;
const DIGITS: u32 = 6;

pub fn generate_secret() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

pub fn generate_backup_codes(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 5];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
        })
        .collect()
}

fn hotp(secret: &[u8], counter: u64) -> u32 {
    let mut mac = HmacSha1::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let truncated = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);
    truncated % 10u32.pow(DIGITS)
}

pub fn totp_at(secret_b32: &str, unix_time: u64) -> Option<u32> {
    let secret = STANDARD.decode(secret_b32).ok()?;
    let counter = unix_time / STEP_SECS;
    Some(hotp(&secret, counter))
}

/// Accepts the current step and one step of clock skew in either direction.
pub fn verify_totp(secret_b32: &str, unix_time: u64, code: u32) -> bool {
    for skew in [0i64, -1, 1] {
        let shifted = (unix_time as i64 + skew * STEP_SECS as i64).max(0) as u64;
        if totp_at(secret_b32, shifted) == Some(code) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totp_matches_current_step() {
        let secret = generate_secret();
        let now = 1_700_000_000u64;
        let code = totp_at(&secret, now).unwrap();
        assert!(verify_totp(&secret, now, code));
    }

    #[test]
    fn totp_rejects_far_future_code() {
        let secret = generate_secret();
        let code = totp_at(&secret, 1_700_000_000).unwrap();
        assert!(!verify_totp(&secret, 1_700_000_000 + 10 * STEP_SECS, code));
    }

    #[test]
    fn backup_codes_are_unique_and_counted() {
        let codes = generate_backup_codes(8);
        assert_eq!(codes.len(), 8);
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), 8);
    }
}
