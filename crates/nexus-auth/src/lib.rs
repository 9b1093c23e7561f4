pub mod identity;
pub mod lockout;
pub mod mfa;
pub mod password;
pub mod service;
pub mod tokens;

pub use identity::IdentityStore;
pub use lockout::CredentialAttemptLog;
pub use service::{permissions_for_roles, AuthService, TokenPair};
pub use tokens::TokenCodec;
